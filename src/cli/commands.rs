use std::path::Path;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Deserialize;

use crate::cli::CliError;
use crate::config::{StaticConfig, get_config};
use crate::services::{CreateLinkRequest, LinkService};
use crate::storage::{SegmentDefinition, StorageFactory};

/// 人群包导入文件
#[derive(Debug, Deserialize)]
pub struct SegmentImportFile {
    pub segments: Vec<SegmentDefinition>,
}

pub fn parse_expires_at(raw: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            CliError::ParseError(format!(
                "Invalid --expires-at '{}': use RFC3339, e.g. 2030-01-01T00:00:00Z",
                raw
            ))
        })
}

pub fn parse_segment_file(content: &str) -> Result<Vec<SegmentDefinition>, CliError> {
    let file: SegmentImportFile = serde_json::from_str(content)
        .map_err(|e| CliError::ParseError(format!("Invalid segment file: {}", e)))?;
    if let Some(empty) = file.segments.iter().find(|s| s.id.trim().is_empty()) {
        return Err(CliError::ParseError(format!(
            "Segment with empty id ({} members)",
            empty.members.len()
        )));
    }
    Ok(file.segments)
}

pub async fn migrate() -> Result<(), CliError> {
    let config = get_config();
    let storage = StorageFactory::create(&config.database).await?;
    println!(
        "{} Migrations applied on {} backend",
        "✓".bold().green(),
        storage.backend_name().cyan()
    );
    Ok(())
}

pub fn config_generate(output_path: Option<String>, force: bool) -> Result<(), CliError> {
    let content = StaticConfig::generate_sample_config();
    let Some(path) = output_path else {
        println!("{}", content);
        return Ok(());
    };

    if !force && Path::new(&path).exists() {
        return Err(CliError::CommandError(format!(
            "{} already exists, use --force to overwrite",
            path
        )));
    }
    std::fs::write(&path, content)
        .map_err(|e| CliError::CommandError(format!("Failed to write {}: {}", path, e)))?;
    println!(
        "{} Configuration file generated: {}",
        "✓".bold().green(),
        path.blue()
    );
    Ok(())
}

pub async fn create_link(
    destination: String,
    campaign_id: String,
    earner_id: String,
    code: Option<String>,
    expires_at: Option<String>,
) -> Result<(), CliError> {
    let expires_at = expires_at.as_deref().map(parse_expires_at).transpose()?;

    let config = get_config();
    let storage = StorageFactory::create(&config.database).await?;
    // 运行中的服务会在下一次过滤器重建时看到新短码
    let service = LinkService::new(storage, None);
    let generated = code.is_none();
    let link = service
        .create(CreateLinkRequest {
            code,
            destination,
            campaign_id,
            earner_id,
            expires_at,
        })
        .await?;

    if generated {
        println!(
            "{} Generated random code: {}",
            "ℹ".bold().blue(),
            link.code.magenta()
        );
    }
    match link.expires_at {
        Some(expires_at) => println!(
            "{} Added short link: {} -> {} (campaign {}, earner {}, expires: {})",
            "✓".bold().green(),
            link.code.cyan(),
            link.destination.blue().underline(),
            link.campaign_id,
            link.earner_id,
            expires_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
                .yellow()
        ),
        None => println!(
            "{} Added short link: {} -> {} (campaign {}, earner {})",
            "✓".bold().green(),
            link.code.cyan(),
            link.destination.blue().underline(),
            link.campaign_id,
            link.earner_id
        ),
    }
    Ok(())
}

pub async fn deactivate_link(code: String) -> Result<(), CliError> {
    let config = get_config();
    let storage = StorageFactory::create(&config.database).await?;
    LinkService::new(storage, None).deactivate(&code).await?;
    println!("{} Deactivated short link: {}", "✓".bold().green(), code.cyan());
    Ok(())
}

pub async fn import_segments(file_path: String) -> Result<(), CliError> {
    let content = std::fs::read_to_string(&file_path)
        .map_err(|e| CliError::CommandError(format!("Failed to read {}: {}", file_path, e)))?;
    let definitions = parse_segment_file(&content)?;
    let members: usize = definitions.iter().map(|d| d.members.len()).sum();

    let config = get_config();
    let storage = StorageFactory::create(&config.database).await?;
    let generation = storage.rebuild_segments(&definitions).await?;

    println!(
        "{} Imported {} segments ({} memberships) as generation {}",
        "✓".bold().green(),
        definitions.len(),
        members,
        generation.to_string().cyan()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segment_file() {
        let defs = parse_segment_file(
            r#"{"segments":[{"id":"deal_seekers","definition":"visited 3+ deals","members":["U1","U2"]},{"id":"runners","members":[]}]}"#,
        )
        .unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].members, vec!["U1", "U2"]);
        assert!(defs[1].definition.is_empty());

        assert!(parse_segment_file(r#"{"segments":[{"id":" ","members":["U1"]}]}"#).is_err());
        assert!(parse_segment_file("not json").is_err());
    }

    #[test]
    fn test_parse_expires_at() {
        assert!(parse_expires_at("2030-01-01T00:00:00Z").is_ok());
        assert!(parse_expires_at("tomorrow").is_err());
    }
}
