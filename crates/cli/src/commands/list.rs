//! List Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::commands::CatalogArgs;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,
}

/// One catalog entry for display
#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub group: String,
    pub name: String,
    pub points: u32,
    pub precondition: String,
    pub tags: Vec<String>,
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Group", "Scenario", "Points", "Precondition", "Tags"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.group.clone(),
            self.name.clone(),
            self.points.to_string(),
            self.precondition.clone(),
            self.tags.join(", "),
        ]
    }
}

pub fn execute(args: ListArgs, format: OutputFormat) -> Result<()> {
    let catalog = args.catalog.load()?;
    let items: Vec<ScenarioDisplay> = catalog
        .scenarios()
        .map(|(group, scenario)| ScenarioDisplay {
            group: group.name.clone(),
            name: scenario.name.clone(),
            points: scenario.points,
            precondition: format!("{:?}", scenario.precondition).to_lowercase(),
            tags: scenario.tags.clone(),
        })
        .collect();

    print_list(&items, format);
    if format == OutputFormat::Table || format == OutputFormat::Plain {
        println!(
            "{} scenario(s) in {} group(s), {} points",
            catalog.scenario_count(),
            catalog.groups().len(),
            catalog.total_points()
        );
    }
    Ok(())
}
