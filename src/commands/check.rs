// ABOUTME: Check command: parses and validates the configuration file.
// ABOUTME: Prints each project with the branches it accepts triggers for.

use std::path::Path;

use stagecoach::config::Config;
use stagecoach::error::Result;

pub fn check(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    println!("{}: ok", config_path.display());

    let mut projects: Vec<_> = config.projects.iter().collect();
    projects.sort_by(|a, b| a.0.cmp(b.0));
    for (name, project) in projects {
        let mut branches: Vec<_> = project.branches.keys().map(String::as_str).collect();
        branches.sort_unstable();
        println!("  {name}: {} (keep {})", branches.join(", "), project.keep);
    }
    Ok(())
}
