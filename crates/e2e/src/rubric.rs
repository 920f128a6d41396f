//! The built-in rubric for the photo sharing application

use crate::catalog::{Catalog, ScenarioGroup};
use crate::error::E2eResult;
use crate::probe::Capability;
use crate::scenario::{Expectation, Fixture, Scenario, Step};
use crate::selector::SelectorSpec;

const SIGN_IN_PATH: &str = "/users/sign_in";

impl Catalog {
    /// The built-in rubric, in reporting order.
    pub fn builtin() -> E2eResult<Self> {
        let mut catalog = Catalog::new();
        for group in [
            record_defaults(),
            home_page(),
            guest_home_page(),
            authentication(),
            user_detail_page(),
            liked_page(),
            comment_creation(),
        ] {
            catalog.register(group)?;
        }
        Ok(catalog)
    }
}

fn users() -> Capability {
    Capability::table("users")
}

fn record_defaults() -> ScenarioGroup {
    let counter_default = |column: &str| {
        Scenario::authenticated(format!("has a default `{}` of 0", column), 1)
            .tag("model")
            .expect(Expectation::ActorColumn {
                column: column.to_string(),
                equals: 0,
            })
            .diagnostic(format!(
                "Expected a new user to have a default `{}` of 0. \
                 Did you make the change in your user migration file?",
                column
            ))
    };

    ScenarioGroup::new("New User record")
        .requires(users())
        .requires(Capability::column("users", "likes_count"))
        .requires(Capability::column("users", "comments_count"))
        .gate_diagnostic(
            "Expected the users table to have counter columns, but {missing} could not be found. \
             Did you run your migrations?",
        )
        .scenario(counter_default("likes_count"))
        .scenario(counter_default("comments_count"))
}

fn home_page() -> ScenarioGroup {
    let visit_home = |name: &str, points: u32| {
        Scenario::authenticated(name, points)
            .tag("home")
            .step(Step::navigate("/"))
    };

    ScenarioGroup::new("The home page")
        .requires(users())
        .scenario(
            visit_home("has a bootstrap navbar", 1)
                .expect(Expectation::has(
                    SelectorSpec::tag("nav").attr_prefix("class", "navbar"),
                ))
                .diagnostic(
                    "Expected home page to have a bootstrap navbar <nav class='navbar ...'> .",
                ),
        )
        .scenario(
            visit_home("has an edit profile link for the signed in user", 1)
                .expect(Expectation::has(
                    SelectorSpec::tag("a")
                        .attr_eq("href", "/users/edit")
                        .with_text("Edit {username}"),
                ))
                .diagnostic(
                    "Expected home page to have 'Edit [USERNAME]' link with the username of the signed in user.",
                ),
        )
        .scenario(
            visit_home(
                "has a sign out link with a DELETE request for the signed in user",
                1,
            )
            .expect(Expectation::has(
                SelectorSpec::tag("a")
                    .attr_eq("href", "/users/sign_out")
                    .attr_eq("data-method", "delete"),
            ))
            .diagnostic(
                "Expected home page to have 'Sign out' link with the proper data-method='delete' if the user is signed in.",
            ),
        )
        .scenario(
            visit_home("does not have a sign in link if the user is already signed in", 1)
                .expect(Expectation::All {
                    of: vec![
                        Expectation::Status { code: 200 },
                        Expectation::lacks(SelectorSpec::tag("a").attr_eq("href", SIGN_IN_PATH)),
                    ],
                })
                .diagnostic("Expected home page to not have 'Sign in' link if the user is signed in."),
        )
}

fn guest_home_page() -> ScenarioGroup {
    ScenarioGroup::new("The home page for guests").scenario(
        Scenario::anonymous("has a sign in link for guests", 1)
            .tag("home")
            .tag("guest")
            .step(Step::navigate("/"))
            .expect(Expectation::has(
                SelectorSpec::tag("a").attr_eq("href", SIGN_IN_PATH),
            ))
            .diagnostic("Expected home page to have a 'Sign in' link if the user is not signed in."),
    )
}

fn authentication() -> ScenarioGroup {
    ScenarioGroup::new("User authentication with the Devise gem")
        .requires(users())
        .scenario(
            Scenario::anonymous("allows a signed up user to sign in", 1)
                .tag("auth")
                .setup(Fixture::Actor)
                .step(Step::navigate(SIGN_IN_PATH))
                .step(Step::fill("Email", "{email}"))
                .step(Step::fill("Password", "{password}"))
                .step(Step::click_button("Log in"))
                .expect(Expectation::current_path("/"))
                .diagnostic("Expected to successfully sign in a signed up user."),
        )
        .scenario(
            Scenario::anonymous(
                "requires sign in before any action with the Devise `before_action :authenticate_user!` method",
                2,
            )
            .tag("auth")
            .tag("guest")
            .setup(Fixture::Actor)
            .step(Step::navigate("/{username}"))
            .expect(Expectation::current_path(SIGN_IN_PATH))
            .diagnostic(
                "Expected `before_action :authenticate_user!` in `ApplicationController` to redirect guest \
                 to /users/sign_in before visiting another page.",
            ),
        )
        .scenario(
            Scenario::authenticated("lets a signed in user visit the edit profile page", 1)
                .tag("auth")
                .step(Step::navigate("/users/edit"))
                .expect(Expectation::All {
                    of: vec![
                        Expectation::Status { code: 200 },
                        Expectation::current_path("/users/edit"),
                    ],
                })
                .diagnostic("Expected a signed in user to be able to visit /users/edit."),
        )
}

fn user_detail_page() -> ScenarioGroup {
    let visit_own_page = |name: &str, points: u32| {
        Scenario::authenticated(name, points)
            .tag("users")
            .setup(Fixture::Photo { count: 1 })
            .step(Step::navigate("/{username}"))
    };

    ScenarioGroup::new("The User details page")
        .requires(users())
        .requires(Capability::table("photos"))
        .scenario(
            visit_own_page("can be visited", 1)
                .expect(Expectation::Status { code: 200 })
                .diagnostic("Expected to visit /[USERNAME] successfully."),
        )
        .scenario(
            visit_own_page("shows the photos on bootstrap cards", 2)
                .expect(Expectation::has(
                    SelectorSpec::tag("div").attr_word("class", "card"),
                ))
                .diagnostic(
                    "Expected /[USERNAME] to have have a <div class='card'> elements to display the photos.",
                ),
        )
        .scenario(
            visit_own_page("shows the caption of each photo", 1)
                .expect(Expectation::has(SelectorSpec::any().with_text("{photo_caption}")))
                .diagnostic("Expected /[USERNAME] to show the caption of each of the user's photos."),
        )
}

fn liked_page() -> ScenarioGroup {
    ScenarioGroup::new("The liked photos page")
        .requires(users())
        .scenario(
            Scenario::authenticated("can be visited at /[USERNAME]/liked", 1)
                .tag("users")
                .step(Step::navigate("/{username}/liked"))
                .expect(Expectation::All {
                    of: vec![
                        Expectation::Status { code: 200 },
                        Expectation::current_path("/{username}/liked"),
                    ],
                })
                .diagnostic("Expected to visit /[USERNAME]/liked successfully."),
        )
}

fn comment_creation() -> ScenarioGroup {
    ScenarioGroup::new("Comment creation")
        .requires(users())
        .requires(Capability::table("photos"))
        .requires(Capability::table("comments"))
        .scenario(
            Scenario::authenticated("adds a comment to a photo from the user page", 2)
                .tag("comments")
                .setup(Fixture::Photo { count: 1 })
                .step(Step::navigate("/{username}"))
                .step(Step::fill("Body", "Nice photo!"))
                .step(Step::click_button("Create Comment"))
                .expect(Expectation::CommentCountDelta { by: 1 })
                .diagnostic(
                    "Expected submitting the comment form on /[USERNAME] to add exactly one comment to the photo.",
                ),
        )
}
