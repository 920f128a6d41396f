//! CLI Commands

pub mod list;
pub mod run;

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;

use rubric_e2e::{Catalog, CatalogFilter};

/// Catalog source and selection, shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
    /// YAML catalog file or directory (default: built-in rubric)
    #[arg(long, env = "RUBRIC_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Only scenarios in this group (repeatable)
    #[arg(long = "group")]
    pub groups: Vec<String>,

    /// Only the scenario with this name (repeatable)
    #[arg(long = "name")]
    pub names: Vec<String>,

    /// Only scenarios with this tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

impl CatalogArgs {
    pub fn filter(&self) -> CatalogFilter {
        CatalogFilter {
            groups: self.groups.clone(),
            names: self.names.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Load the selected catalog. An empty selection is an error.
    pub fn load(&self) -> Result<Catalog> {
        let catalog = match &self.catalog {
            Some(path) => Catalog::load(path)
                .with_context(|| format!("Failed to load catalog from {}", path.display()))?,
            None => Catalog::builtin().context("Built-in rubric is invalid")?,
        };
        let selected = catalog.filter(&self.filter());
        if selected.is_empty() {
            bail!("No scenarios match the given --group/--name/--tag filters");
        }
        Ok(selected)
    }
}
