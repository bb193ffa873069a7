//! Command implementations for the river daemon.
//!
//! Handles:
//! - start: load config, wire up the river components, run the coordinator
//!   until SIGINT
//! - check-config: validate configuration and print the effective setup

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use river_builder::IssueIndexStructureBuilder;
use river_indexer::{
    ActivityLogWriter, CoordinatorConfig, IndexerCoordinator, ProjectCatalog, RiverRegistry,
};
use river_jira::{JiraClient, JiraRestClient};
use river_search::{DatetimeStore, HttpSearchBackend, SearchBackend};
use river_types::RiverSettings;

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wire up all river components from settings.
fn build_river(
    settings: &RiverSettings,
) -> Result<(IndexerCoordinator, Arc<JiraRestClient>, Arc<IssueIndexStructureBuilder>)> {
    let index_name = settings.issue_index_name();
    let builder = Arc::new(
        IssueIndexStructureBuilder::new(
            &settings.river_name,
            &index_name,
            &settings.jira.url_base,
            &settings.index,
        )
        .context("Invalid index structure configuration")?,
    );

    let jira = Arc::new(
        JiraRestClient::new(&settings.jira, builder.required_call_fields_csv())
            .context("Invalid upstream tracker configuration")?,
    );

    let backend: Arc<dyn SearchBackend> = Arc::new(
        HttpSearchBackend::new(
            &settings.search.url,
            Duration::from_secs(settings.search.timeout_secs),
        )
        .context("Invalid search backend configuration")?,
    );

    let store = Arc::new(DatetimeStore::new(
        backend.clone(),
        settings.state_index.clone(),
        settings.river_name.clone(),
    ));

    let jira_dyn: Arc<dyn JiraClient> = jira.clone();
    let catalog = ProjectCatalog::from_settings(jira_dyn.clone(), &settings.jira);
    let activity = settings
        .activity_log
        .as_ref()
        .map(|log| ActivityLogWriter::new(backend.clone(), log));

    let coordinator = IndexerCoordinator::new(
        CoordinatorConfig::from_settings(&settings.jira),
        jira_dyn,
        backend,
        builder.clone(),
        store,
        catalog,
        activity,
    );

    Ok((coordinator, jira, builder))
}

/// Start the river and run until SIGINT.
pub async fn start_river(config_path: Option<&str>, log_level: Option<&str>) -> Result<()> {
    let mut settings = RiverSettings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    init_tracing(&settings.log_level);

    let (coordinator, jira, _builder) = build_river(&settings)?;

    info!(
        url_base = %settings.jira.url_base,
        user = settings.jira.username.as_deref().unwrap_or("anonymous access"),
        jql_time_zone = %jira.jql_time_zone(),
        index = %settings.issue_index_name(),
        issue_type = %settings.index.doc_type,
        "Created river"
    );
    if let Some(log) = &settings.activity_log {
        info!(
            index = %log.index,
            doc_type = %log.doc_type,
            "Activity log enabled"
        );
    }

    let handle = coordinator.handle();
    let registry = RiverRegistry::new();
    registry.register(&settings.river_name, handle.clone());

    let coordinator_task = tokio::spawn(coordinator.run());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, closing river");

    handle.shutdown();
    registry.unregister(&settings.river_name);
    coordinator_task.await.context("Coordinator task failed")?;
    Ok(())
}

/// Validate the configuration and print the effective setup.
pub fn check_config(config_path: Option<&str>) -> Result<()> {
    let settings = RiverSettings::load(config_path).context("Failed to load configuration")?;
    let (_, jira, builder) = build_river(&settings)?;

    println!("configuration OK");
    println!("river name:      {}", settings.river_name);
    println!("upstream:        {}", settings.jira.url_base);
    println!("jql timezone:    {}", jira.jql_time_zone());
    println!("search backend:  {}", settings.search.url);
    println!("issue index:     {}", settings.issue_index_name());
    println!("issue type:      {}", settings.index.doc_type);
    println!("comment mode:    {:?}", builder.comment_mode());
    println!("call fields:     {}", builder.required_call_fields_csv());
    match &settings.activity_log {
        Some(log) => println!("activity log:    {} ({})", log.index, log.doc_type),
        None => println!("activity log:    disabled"),
    }
    Ok(())
}
