use anyhow::Result;

use doralite::{frepp, DoraClient, TsGroup};

use crate::cli::create_spinner;

pub async fn missing(
    client: &DoraClient,
    id: &str,
    component: &str,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<String> {
    let spinner = create_spinner(format!("Inspecting {} for {}...", component, id));
    let group = TsGroup::fetch(client, id, component, start, end).await?;
    spinner.finish_with_message("Inspection complete");

    let missing = group.missing()?;
    if missing.is_empty() {
        return Ok(format!(
            "{} is complete over {}-{}",
            component, group.start, group.end
        ));
    }

    let years: Vec<String> = missing.iter().map(|y| y.to_string()).collect();

    Ok(format!(
        "{} is missing chunks ending in: {}",
        component,
        years.join(", ")
    ))
}

pub async fn repair(client: &DoraClient, id: &str, components: &[String]) -> Result<String> {
    let spinner = create_spinner(format!("Planning repair for {}...", id));
    let components = (!components.is_empty()).then(|| components.to_vec());
    let commands = frepp::repair_all_components(client, id, components).await?;
    spinner.finish_with_message("Repair planned");

    if commands.is_empty() {
        return Ok("Nothing to repair".to_string());
    }

    Ok(commands.join("\n"))
}
