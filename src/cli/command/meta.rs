use anyhow::Result;

use doralite::DoraClient;

use crate::cli::create_spinner;

pub async fn meta(client: &DoraClient, id: &str) -> Result<String> {
    let spinner = create_spinner(format!("Fetching metadata for {}...", id));
    let metadata = client.metadata(id).await?;
    spinner.finish_with_message("Metadata fetched");

    let mut lines = vec![
        format!("id:           {}", display_id(metadata.id)),
        format!("name:         {}", metadata.exp_name),
        format!("pp path:      {}", metadata.path_pp),
        format!("history path: {}", metadata.path_history),
    ];
    if let Some(path_db) = &metadata.path_db {
        lines.push(format!("db path:      {}", path_db));
    }
    if let Some(path_xml) = &metadata.path_xml {
        lines.push(format!("xml path:     {}", path_xml));
    }
    if let Some(path_analysis) = &metadata.path_analysis {
        lines.push(format!("analysis:     {}", path_analysis));
    }
    if let Some((start, end)) = metadata.year_span() {
        lines.push(format!("years:        {}-{}", start, end));
    }
    if let Some(owner) = &metadata.owner {
        lines.push(format!("owner:        {}", owner));
    }
    if let Some(model) = &metadata.model {
        lines.push(format!("model:        {}", model));
    }

    Ok(lines.join("\n"))
}

fn display_id(id: Option<i64>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => "unregistered".to_string(),
    }
}

// -- Tests -------------------------------------------------------------------
