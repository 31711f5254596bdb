//! Command-line interface definitions

use crate::aggregation::GroupBy;
use crate::types::ItemKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Usage-ROI analytics over automation run data
#[derive(Parser, Debug)]
#[command(name = "roistat", version, about)]
pub struct Cli {
    /// Service origin, e.g. https://platform.example.com
    #[arg(long, env = "ROISTAT_ORIGIN")]
    pub origin: String,

    /// Account identifier
    #[arg(long, env = "ROISTAT_ACCOUNT_ID")]
    pub account_id: String,

    /// Tenant filter; omit to query all tenants
    #[arg(long, env = "ROISTAT_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Lookback window in days
    #[arg(long, default_value_t = 30)]
    pub lookback_days: u32,

    /// Settings file; loaded on start, saved after estimate/categorize
    #[arg(long, env = "ROISTAT_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Emit JSON instead of tables
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Which item kind a command operates on
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    /// Orchestration-level playbooks
    Playbooks,
    /// Individual actions
    Actions,
}

impl From<KindArg> for ItemKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Playbooks => ItemKind::Playbook,
            KindArg::Actions => ItemKind::Action,
        }
    }
}

/// Grouping key for report rows
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupByArg {
    /// One row per item
    Item,
    /// One row per fully-qualified name
    Fqn,
    /// One row per tenant
    Tenant,
}

impl From<GroupByArg> for GroupBy {
    fn from(arg: GroupByArg) -> Self {
        match arg {
            GroupByArg::Item => GroupBy::ItemId,
            GroupByArg::Fqn => GroupBy::Fqn,
            GroupByArg::Tenant => GroupBy::TenantId,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Aggregate usage into savings rows and totals
    Report {
        /// Item kind to report on
        #[arg(long, value_enum, default_value_t = KindArg::Playbooks)]
        kind: KindArg,

        /// Grouping key
        #[arg(long, value_enum, default_value_t = GroupByArg::Item)]
        group_by: GroupByArg,

        /// Keep only rows assigned to this category id
        #[arg(long)]
        category: Option<String>,

        /// Row ids excluded from totals (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Roll rows up per category instead of listing them
        #[arg(long)]
        by_category: bool,

        /// Show per-day savings buckets instead of rows
        #[arg(long)]
        daily: bool,

        /// Annual license cost allocated across action runs in category
        /// rollups
        #[arg(long, default_value_t = 0.0)]
        license_cost: f64,
    },

    /// Ask the AI assistant for per-item manual-time estimates
    Estimate {
        /// Item kind to estimate
        #[arg(long, value_enum, default_value_t = KindArg::Playbooks)]
        kind: KindArg,
    },

    /// Ask the AI assistant to categorize items
    Categorize {
        /// Item kind to categorize
        #[arg(long, value_enum, default_value_t = KindArg::Playbooks)]
        kind: KindArg,
    },

    /// Summarize prompt-assistant usage over the window
    Prompts,
}
