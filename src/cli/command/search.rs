use anyhow::Result;

use doralite::DoraClient;

use crate::cli::create_spinner;

pub async fn search(client: &DoraClient, query: &str, attribute: &str) -> Result<String> {
    let spinner = create_spinner(format!("Searching for `{}`...", query));
    let results = client.search(query, attribute).await?;
    spinner.finish_with_message("Search complete");

    if results.is_empty() {
        return Ok(format!("No experiments match `{}`", query));
    }

    let lines: Vec<String> = results
        .iter()
        .map(|(id, value)| format!("{:>8}  {}", id, value))
        .collect();

    Ok(lines.join("\n"))
}

pub async fn projects(client: &DoraClient) -> Result<String> {
    let spinner = create_spinner("Fetching project listing...".to_string());
    let projects = client.list_projects().await?;
    spinner.finish_with_message("Projects fetched");

    let lines: Vec<String> = projects
        .iter()
        .map(|(key, entry)| {
            let name = entry
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or("(unnamed)");
            format!("{:>8}  {}", key, name)
        })
        .collect();

    Ok(lines.join("\n"))
}
