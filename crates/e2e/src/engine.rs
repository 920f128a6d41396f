//! Scenario execution and assertion evaluation
//!
//! Every scenario runs in its own [`ScenarioContext`]: a fresh session, the
//! actor created for it and the records set up on its behalf. Nothing is
//! shared between scenarios apart from the fixture factory's store handle.
//! Whatever goes wrong inside a scenario ends up in its [`ScenarioResult`].

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use rubric_common::{Actor, Comment, FixtureFactory, Outcome, Photo, ScenarioResult};

use crate::driver::{DriverConfig, Session};
use crate::error::{E2eError, E2eResult};
use crate::scenario::{Expectation, Fixture, Precondition, Scenario, Step};
use crate::template::Bindings;

/// Bounds on suspension points
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Each fixture call against the store
    pub fixture: Duration,
    /// A whole scenario, setup included
    pub scenario: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fixture: Duration::from_secs(5),
            scenario: Duration::from_secs(60),
        }
    }
}

/// What a scenario needs from the run: the shared factory plus settings
/// for the session it will create for itself.
#[derive(Clone)]
pub struct ScenarioEnv {
    pub factory: FixtureFactory,
    pub driver: DriverConfig,
    pub timeouts: Timeouts,
}

/// Per-scenario state passed through setup, steps and assertion
pub struct ScenarioContext {
    session: Session,
    factory: FixtureFactory,
    timeouts: Timeouts,
    actor: Option<Actor>,
    photos: Vec<Photo>,
    comments: Vec<Comment>,
    comment_baseline: Option<i64>,
}

impl ScenarioContext {
    pub fn new(env: &ScenarioEnv) -> E2eResult<Self> {
        Ok(Self {
            session: Session::new(env.driver.clone())?,
            factory: env.factory.clone(),
            timeouts: env.timeouts,
            actor: None,
            photos: Vec::new(),
            comments: Vec::new(),
            comment_baseline: None,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn actor(&self) -> Option<&Actor> {
        self.actor.as_ref()
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    /// Placeholder values available to steps and expectations
    pub fn bindings(&self) -> Bindings {
        let mut bindings = Bindings::new();
        if let Some(actor) = &self.actor {
            bindings.set("username", actor.username.clone());
            bindings.set("email", actor.email.clone());
            bindings.set("password", actor.password.clone());
            bindings.set("actor_id", actor.id.to_string());
        }
        if let Some(photo) = self.photos.first() {
            bindings.set("photo_id", photo.id.to_string());
            bindings.set("photo_caption", photo.caption.clone());
        }
        if let Some(comment) = self.comments.first() {
            bindings.set("comment_id", comment.id.to_string());
        }
        bindings
    }

    /// Run a blocking fixture call on the blocking pool, bounded by the
    /// fixture timeout.
    async fn fixture<T, F>(&self, operation: &str, call: F) -> E2eResult<T>
    where
        F: FnOnce(FixtureFactory) -> rubric_common::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let factory = self.factory.clone();
        let limit = self.timeouts.fixture;
        match tokio::time::timeout(limit, tokio::task::spawn_blocking(move || call(factory))).await
        {
            Err(_) => Err(E2eError::InteractionTimeout {
                operation: operation.to_string(),
                after_ms: limit.as_millis() as u64,
            }),
            Ok(Err(join)) => Err(E2eError::Worker(join.to_string())),
            Ok(Ok(result)) => result.map_err(E2eError::from),
        }
    }

    async fn ensure_actor(&mut self) -> E2eResult<Actor> {
        if let Some(actor) = &self.actor {
            return Ok(actor.clone());
        }
        let actor = self.fixture("actor creation", |f| f.create_actor()).await?;
        debug!("Scenario actor is {}", actor.username);
        self.actor = Some(actor.clone());
        Ok(actor)
    }

    /// Create an actor and sign the session in as them.
    pub async fn sign_in_new_actor(&mut self) -> E2eResult<Actor> {
        let actor = self.ensure_actor().await?;
        authenticate(&mut self.session, &actor).await?;
        Ok(actor)
    }

    pub async fn apply(&mut self, fixture: &Fixture) -> E2eResult<()> {
        match fixture {
            Fixture::Actor => {
                self.ensure_actor().await?;
            }
            Fixture::Photo { count } => {
                let owner = self.ensure_actor().await?;
                for _ in 0..*count {
                    let owner = owner.clone();
                    let photo = self
                        .fixture("photo creation", move |f| f.create_photo(&owner))
                        .await?;
                    self.photos.push(photo);
                }
            }
            Fixture::Comment => {
                let author = self.ensure_actor().await?;
                let photo = self
                    .photos
                    .first()
                    .cloned()
                    .ok_or(E2eError::MissingFixture("photo"))?;
                let comment = self
                    .fixture("comment creation", move |f| f.create_comment(&author, &photo))
                    .await?;
                self.comments.push(comment);
            }
        }
        Ok(())
    }

    /// Record counts that delta expectations compare against.
    pub async fn record_baselines(&mut self, expectation: &Expectation) -> E2eResult<()> {
        if expectation.needs_comment_baseline() {
            let photo = self
                .photos
                .first()
                .cloned()
                .ok_or(E2eError::MissingFixture("photo"))?;
            let count = self
                .fixture("comment count", move |f| f.comment_count(&photo))
                .await?;
            self.comment_baseline = Some(count);
        }
        Ok(())
    }

    pub async fn perform(&mut self, step: &Step) -> E2eResult<()> {
        debug!("step {}", step.describe());
        let bindings = self.bindings();
        match step {
            Step::Navigate { path } => self.session.navigate(&bindings.resolve(path)?).await,
            Step::Fill { label, value } => self
                .session
                .fill_field(&bindings.resolve(label)?, &bindings.resolve(value)?),
            Step::ClickButton { label } => {
                self.session.click_button(&bindings.resolve(label)?).await
            }
            Step::ClickLink { label } => self.session.click_link(&bindings.resolve(label)?).await,
            Step::SignOut => self.session.sign_out().await,
        }
    }

    /// Evaluate an expectation against the session and the store.
    /// Conjunctions short-circuit on the first leaf that does not hold.
    pub async fn evaluate(&self, expectation: &Expectation) -> E2eResult<bool> {
        let mut pending = vec![expectation];
        while let Some(next) = pending.pop() {
            match next {
                Expectation::All { of } => pending.extend(of.iter().rev()),
                leaf => {
                    if !self.evaluate_leaf(leaf).await? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    async fn evaluate_leaf(&self, expectation: &Expectation) -> E2eResult<bool> {
        let bindings = self.bindings();
        match expectation {
            Expectation::HasElement { selector } => {
                self.session.has_element(&selector.resolve(&bindings)?)
            }
            Expectation::LacksElement { selector } => {
                self.session.lacks_element(&selector.resolve(&bindings)?)
            }
            Expectation::CurrentPath { path } => {
                let current = self.session.current_path().ok_or(E2eError::NoPage)?;
                Ok(current == bindings.resolve(path)?)
            }
            Expectation::Status { code } => {
                let status = self.session.status_code().ok_or(E2eError::NoPage)?;
                Ok(status == *code)
            }
            Expectation::ActorColumn { column, equals } => {
                let actor = self.actor.clone().ok_or(E2eError::MissingFixture("actor"))?;
                let column = column.clone();
                match self
                    .fixture("actor read-back", move |f| f.actor_counter(&actor, &column))
                    .await
                {
                    Ok(value) => Ok(value == *equals),
                    // NULL column
                    Err(E2eError::Fixture(rubric_common::Error::NotFound { .. })) => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Expectation::CommentCountDelta { by } => {
                let photo = self
                    .photos
                    .first()
                    .cloned()
                    .ok_or(E2eError::MissingFixture("photo"))?;
                let baseline = self
                    .comment_baseline
                    .ok_or(E2eError::MissingFixture("comment baseline"))?;
                let now = self
                    .fixture("comment count", move |f| f.comment_count(&photo))
                    .await?;
                debug!("comment count {} -> {}", baseline, now);
                Ok(now - baseline == *by)
            }
            // flattened by evaluate
            Expectation::All { .. } => Ok(true),
        }
    }
}

/// Sign in through the UI: visit the sign-in page, fill email and password,
/// submit. A submission that stays on the sign-in page is not an error
/// here; callers check [`Session::is_authenticated`].
pub async fn authenticate(session: &mut Session, actor: &Actor) -> E2eResult<()> {
    let config = session.config().clone();
    session.navigate(&config.sign_in_path).await?;
    session.fill_field(&config.email_label, &actor.email)?;
    session.fill_field(&config.password_label, &actor.password)?;
    session.click_button(&config.sign_in_button).await?;
    if !session.is_authenticated() {
        warn!(
            "Sign-in for {} stayed on {}",
            actor.username,
            session.current_path().unwrap_or("?")
        );
    }
    Ok(())
}

/// Drive one scenario. An expectation that does not hold comes back as
/// [`E2eError::AssertionMismatch`] carrying the scenario's diagnostic.
async fn execute(scenario: &Scenario, env: &ScenarioEnv) -> E2eResult<()> {
    let mut ctx = ScenarioContext::new(env)?;

    if scenario.precondition == Precondition::Authenticated {
        let actor = ctx.sign_in_new_actor().await?;
        if !ctx.session().is_authenticated() {
            return Err(E2eError::NotAuthenticated {
                username: actor.username,
                path: ctx.session().current_path().unwrap_or_default().to_string(),
            });
        }
    }

    for fixture in &scenario.setup {
        ctx.apply(fixture).await?;
    }
    ctx.record_baselines(&scenario.expect).await?;

    for step in &scenario.steps {
        ctx.perform(step).await?;
    }

    if ctx.evaluate(&scenario.expect).await? {
        Ok(())
    } else {
        Err(E2eError::AssertionMismatch(scenario.diagnostic.clone()))
    }
}

/// Run one scenario to a result. Never fails: mismatches become `Failed`,
/// every error becomes `Errored` with its cause as the diagnostic.
pub async fn run_scenario(group: &str, scenario: &Scenario, env: &ScenarioEnv) -> ScenarioResult {
    let start = Instant::now();
    debug!("Running scenario: {}", scenario.name);

    let limit = env.timeouts.scenario;
    let verdict = match tokio::time::timeout(limit, execute(scenario, env)).await {
        Ok(verdict) => verdict,
        Err(_) => Err(E2eError::InteractionTimeout {
            operation: format!("scenario {:?}", scenario.name),
            after_ms: limit.as_millis() as u64,
        }),
    };

    let (outcome, diagnostic) = match verdict {
        Ok(()) => (Outcome::Passed, None),
        Err(E2eError::AssertionMismatch(diagnostic)) => (Outcome::Failed, Some(diagnostic)),
        Err(e) => (Outcome::Errored, Some(errored_diagnostic(&e))),
    };

    ScenarioResult {
        name: scenario.name.clone(),
        group: group.to_string(),
        points: scenario.points,
        outcome,
        diagnostic,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

fn errored_diagnostic(error: &E2eError) -> String {
    match error {
        E2eError::Fixture(rubric_common::Error::FixtureSetup { .. }) => format!(
            "Could not set up the scenario; the application's schema does not match the rubric. {}",
            error
        ),
        E2eError::NotAuthenticated { .. } => format!(
            "Could not sign in before checking this behavior. {}",
            error
        ),
        _ => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rubric_common::{FactoryConfig, Store};

    const USERS: &str = r#"
        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL DEFAULT '',
            encrypted_password TEXT NOT NULL DEFAULT '',
            username TEXT,
            likes_count INTEGER DEFAULT 0,
            comments_count INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#;

    fn env() -> ScenarioEnv {
        let store = Store::open_memory().unwrap();
        store.execute_batch(USERS).unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        ScenarioEnv {
            factory: FixtureFactory::new(store, FactoryConfig::default()),
            driver: DriverConfig {
                base_url: format!("http://127.0.0.1:{}", port),
                request_timeout: Duration::from_secs(2),
                ..Default::default()
            },
            timeouts: Timeouts::default(),
        }
    }

    fn counter(column: &str) -> Scenario {
        Scenario::anonymous(format!("{} defaults to zero", column), 1)
            .setup(Fixture::Actor)
            .expect(Expectation::ActorColumn {
                column: column.to_string(),
                equals: 0,
            })
            .diagnostic(format!("Expected new users to have 0 {}.", column))
    }

    #[tokio::test]
    async fn test_counter_default_passes_without_a_page() {
        let result = run_scenario("New User record", &counter("likes_count"), &env()).await;
        assert_eq!(result.outcome, Outcome::Passed);
        assert!(result.diagnostic.is_none());
        assert_eq!(result.group, "New User record");
    }

    #[tokio::test]
    async fn test_null_counter_fails_with_authored_diagnostic() {
        let result = run_scenario("New User record", &counter("comments_count"), &env()).await;
        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(
            result.diagnostic.as_deref(),
            Some("Expected new users to have 0 comments_count.")
        );
    }

    #[tokio::test]
    async fn test_unmet_expectation_is_assertion_mismatch() {
        let err = execute(&counter("comments_count"), &env()).await.unwrap_err();
        assert!(
            matches!(err, E2eError::AssertionMismatch(ref d) if d == "Expected new users to have 0 comments_count."),
            "{err}"
        );
        assert!(execute(&counter("likes_count"), &env()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_table_errors_with_schema_hint() {
        let scenario = Scenario::anonymous("lists photos", 2)
            .setup(Fixture::Photo { count: 1 })
            .expect(Expectation::Status { code: 200 })
            .diagnostic("Expected photos.");
        let result = run_scenario("Photos", &scenario, &env()).await;
        assert_eq!(result.outcome, Outcome::Errored);
        let diagnostic = result.diagnostic.clone().unwrap();
        assert!(diagnostic.starts_with("Could not set up the scenario"), "{diagnostic}");
        assert!(diagnostic.contains("`photos`"), "{diagnostic}");
        assert_eq!(result.earned(), 0);
    }

    #[tokio::test]
    async fn test_page_expectation_without_navigation_errors() {
        let scenario = Scenario::anonymous("is somewhere", 1)
            .expect(Expectation::current_path("/"))
            .diagnostic("Expected to be home.");
        let result = run_scenario("Home", &scenario, &env()).await;
        assert_eq!(result.outcome, Outcome::Errored);
        assert_eq!(result.diagnostic.as_deref(), Some("No page has been loaded yet"));
    }

    #[tokio::test]
    async fn test_authenticated_scenario_against_dead_target_errors() {
        let scenario = Scenario::authenticated("has a navbar", 1)
            .step(Step::navigate("/"))
            .expect(Expectation::has(crate::SelectorSpec::tag("nav")))
            .diagnostic("Expected a navbar.");
        let result = run_scenario("Home", &scenario, &env()).await;
        assert_eq!(result.outcome, Outcome::Errored);
        assert_ne!(result.diagnostic.as_deref(), Some("Expected a navbar."));
    }

    #[tokio::test]
    async fn test_empty_conjunction_holds() {
        let ctx = ScenarioContext::new(&env()).unwrap();
        assert!(ctx.evaluate(&Expectation::All { of: Vec::new() }).await.unwrap());
        assert!(ctx.bindings().resolve("{username}").is_err());
    }
}
