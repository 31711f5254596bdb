//! roistat binary entrypoint

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use roistat::aggregation::{self, AggregationRequest, CacheKey, GroupBy, NameMaps, TotalsCache};
use roistat::chat_session::ChatEndpoint;
use roistat::cli::{Cli, Command};
use roistat::config::ConfigDefaults;
use roistat::data_loader::{
    ACTION_USAGE_PATH, Context, PLAYBOOK_USAGE_PATH, UsageClient, UsageQuery, display_name,
    parent_name,
};
use roistat::date_range::DateRange;
use roistat::estimator::{Estimator, EstimatorTuning};
use roistat::output;
use roistat::settings::{FileSettingsStore, Settings, SettingsStore};
use roistat::types::{ItemId, ItemKind, UsageRecord};
use std::collections::HashSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> roistat::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let context = Context {
        origin: cli.origin.clone(),
        account_id: cli.account_id.clone(),
        tenant_id: cli.tenant_id.clone(),
    };
    let client = UsageClient::new(context)?;
    let range = DateRange::from_lookback(cli.lookback_days);
    let settings_store = cli.settings.as_ref().map(FileSettingsStore::new);
    let mut settings = match &settings_store {
        Some(store) => store.load().await?.unwrap_or_default(),
        None => Settings::default(),
    };
    let endpoint = ChatEndpoint {
        origin: cli.origin.clone(),
        account_id: cli.account_id.clone(),
        tenant_id: cli.tenant_id.clone().unwrap_or_default(),
    };

    match cli.command {
        Command::Report { kind, group_by, category, exclude, by_category, daily, license_cost } => {
            let kind = ItemKind::from(kind);
            let records = load_records(&client, kind, &range, cli.tenant_id.as_deref()).await?;
            let names = load_names(&client, &records).await?;

            let mut excluded: HashSet<String> = exclude.into_iter().collect();
            excluded.extend(settings.excluded_rows.iter().cloned());

            if daily {
                let buckets = aggregation::daily_metrics(
                    &records,
                    &settings.config,
                    &names,
                    kind,
                    defaults_for(kind, &settings),
                );
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&buckets)?);
                } else {
                    output::daily_table(&buckets).printstd();
                }
            } else {
                let mut request = AggregationRequest::new(
                    kind,
                    group_by.into(),
                    defaults_for(kind, &settings),
                    &excluded,
                );
                request.category_filter = category.as_deref();
                let result = aggregation::aggregate(&records, &settings.config, &names, &request);

                if by_category {
                    let rollups = match kind {
                        ItemKind::Playbook => {
                            aggregation::playbook_rollup(&result.rows, &settings.config)
                        }
                        ItemKind::Action => {
                            aggregation::action_rollup(&result.rows, &settings.config, license_cost)
                        }
                    };
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&rollups)?);
                    } else {
                        output::rollup_table(&rollups, kind == ItemKind::Action).printstd();
                    }
                } else if cli.json {
                    println!("{}", output::report_json(&result)?);
                } else {
                    output::rows_table(&result).printstd();
                }
            }

            if !cli.json {
                let mut cache = TotalsCache::new();
                let key = CacheKey {
                    tenant: cli.tenant_id.clone(),
                    lookback_days: cli.lookback_days,
                    default_time: settings.playbook_defaults.time,
                    default_cost: settings.playbook_defaults.cost,
                };
                let playbook_records = (kind == ItemKind::Playbook).then(|| records.clone());
                let client_ref = &client;
                let range_ref = &range;
                let tenant = cli.tenant_id.clone();
                let total = aggregation::load_total_savings(
                    &mut cache,
                    &settings.config,
                    key,
                    || async move {
                        match playbook_records {
                            Some(records) => Ok(records),
                            None => {
                                let query = UsageQuery::for_range(range_ref, tenant.as_deref());
                                client_ref.load_usage(PLAYBOOK_USAGE_PATH, &query, range_ref).await
                            }
                        }
                    },
                )
                .await?;
                println!(
                    "Overall playbook savings: {} runs, {:.2} hours, ${:.2}",
                    total.primary_metric, total.hours, total.dollars
                );
            }
        }

        Command::Estimate { kind } => {
            let kind = ItemKind::from(kind);
            let records = load_records(&client, kind, &range, cli.tenant_id.as_deref()).await?;
            let names = load_names(&client, &records).await?;
            let items = collect_items(&records, kind, &names);
            info!(items = items.len(), "requesting time estimates");

            let estimator = Estimator::new(endpoint, EstimatorTuning::default());
            let mut config = settings.config.clone();
            let bar = progress_bar();
            let outcome = estimator
                .estimate_times(
                    &mut config,
                    kind,
                    &items,
                    defaults_for(kind, &settings),
                    |_, completed, total| {
                        bar.set_length(total as u64);
                        bar.set_position(completed as u64);
                    },
                )
                .await?;
            bar.finish_and_clear();

            settings.config = config;
            if let Some(store) = &settings_store {
                store.save(&settings).await?;
            }

            let excluded: HashSet<String> = settings.excluded_rows.iter().cloned().collect();
            let request = AggregationRequest::new(
                kind,
                GroupBy::ItemId,
                defaults_for(kind, &settings),
                &excluded,
            );
            let result = aggregation::aggregate(&records, &settings.config, &names, &request);
            if cli.json {
                println!("{}", output::report_json(&result)?);
            } else {
                println!(
                    "Applied {} estimates ({} skipped, {} failed batches)",
                    outcome.applied, outcome.skipped, outcome.failed_batches
                );
                output::rows_table(&result).printstd();
            }
        }

        Command::Categorize { kind } => {
            let kind = ItemKind::from(kind);
            let records = load_records(&client, kind, &range, cli.tenant_id.as_deref()).await?;
            let names = load_names(&client, &records).await?;
            let items = collect_items(&records, kind, &names);
            info!(items = items.len(), "requesting categorization");

            let estimator = Estimator::new(endpoint, EstimatorTuning::default());
            let mut config = settings.config.clone();
            let bar = progress_bar();
            let outcome = estimator
                .categorize(&mut config, kind, &items, |_, completed, total| {
                    bar.set_length(total as u64);
                    bar.set_position(completed as u64);
                })
                .await?;
            bar.finish_and_clear();

            settings.config = config;
            if let Some(store) = &settings_store {
                store.save(&settings).await?;
            }

            let excluded: HashSet<String> = settings.excluded_rows.iter().cloned().collect();
            let request = AggregationRequest::new(
                kind,
                GroupBy::ItemId,
                defaults_for(kind, &settings),
                &excluded,
            );
            let result = aggregation::aggregate(&records, &settings.config, &names, &request);
            if cli.json {
                println!("{}", output::report_json(&result)?);
            } else {
                println!(
                    "Applied {} categories ({} skipped, {} failed batches)",
                    outcome.applied, outcome.skipped, outcome.failed_batches
                );
                output::rows_table(&result).printstd();
            }
        }

        Command::Prompts => {
            let usage = client.load_prompt_usage(&range).await?;
            let total = aggregation::prompt_grand_total(&usage, settings.prompt_defaults);
            if cli.json {
                let value = serde_json::json!({ "usage": usage, "grand_total": total });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                output::prompt_table(&usage, &total).printstd();
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "roistat=debug" } else { "roistat=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn defaults_for(kind: ItemKind, settings: &Settings) -> ConfigDefaults {
    match kind {
        ItemKind::Playbook => settings.playbook_defaults,
        ItemKind::Action => settings.action_defaults,
    }
}

async fn load_records(
    client: &UsageClient,
    kind: ItemKind,
    range: &DateRange,
    tenant_id: Option<&str>,
) -> roistat::Result<Vec<UsageRecord>> {
    let path = match kind {
        ItemKind::Playbook => PLAYBOOK_USAGE_PATH,
        ItemKind::Action => ACTION_USAGE_PATH,
    };
    let query = UsageQuery::for_range(range, tenant_id);
    let records = client.load_usage(path, &query, range).await?;
    info!(records = records.len(), "usage records loaded");
    Ok(records)
}

async fn load_names(client: &UsageClient, records: &[UsageRecord]) -> roistat::Result<NameMaps> {
    let mut names = NameMaps::default();
    for metadata in client.load_metadata().await? {
        names.display.insert(metadata.playbook_id.clone(), display_name(&metadata));
        names.parents.insert(metadata.playbook_id.clone(), parent_name(&metadata));
    }
    names.tenants = client.load_tenant_names().await?;

    let mut tenant_ids: Vec<String> = records.iter().filter_map(|r| r.tenant_id.clone()).collect();
    tenant_ids.sort();
    tenant_ids.dedup();
    let failed = client.backfill_component_names(&tenant_ids, &mut names.display).await;
    if failed > 0 {
        info!(failed, "some tenant name lookups failed, continuing with partial names");
    }
    Ok(names)
}

fn collect_items(
    records: &[UsageRecord],
    kind: ItemKind,
    names: &NameMaps,
) -> Vec<(ItemId, String)> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    for record in records {
        let (id, name) = match kind {
            ItemKind::Playbook => {
                let Some(id) = record.playbook_id.as_deref() else { continue };
                let name =
                    names.display.get(id).cloned().unwrap_or_else(|| id.to_string());
                (ItemId::new(id), name)
            }
            ItemKind::Action => {
                let name = aggregation::action_row_name(record, names);
                (ItemId::new(name.clone()), name)
            }
        };
        if seen.insert(id.clone()) {
            items.push((id, name));
        }
    }
    items
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} batches {msg}")
    {
        bar.set_style(style);
    }
    bar
}
