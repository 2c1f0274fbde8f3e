//! gateway-lb CLI - compile Gateway bundles into load balancer stacks.
//!
//! This is the entry point for the `gwlb` binary. All cloud lookups are
//! answered from the bundle's inventory, so compilation never touches AWS.

mod bundle;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gateway_lb_builder::{GatewayModelBuilder, Providers};
use gateway_lb_core::{NamespacedName, StringToken};
use gateway_lb_model::crd::{
    ListenerRuleConfiguration, LoadBalancerConfiguration, TargetGroupConfiguration,
};
use gateway_lb_model::Stack;
use kube::CustomResourceExt;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bundle::Bundle;

/// gateway-lb CLI - compile Gateway bundles into load balancer stacks.
#[derive(Parser, Debug)]
#[command(name = "gwlb")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging.
    #[arg(long, global = true, default_value = "false")]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a bundle and print the resulting stack as JSON.
    Compile {
        /// Path to the JSON bundle.
        #[arg(long, env = "GATEWAY_LB_BUNDLE")]
        bundle: PathBuf,

        /// Pretty-print the output.
        #[arg(long, default_value = "false")]
        pretty: bool,
    },
    /// Print the configuration CustomResourceDefinitions as JSON.
    Crds,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompileOutput<'a> {
    stack: &'a Stack,
    secrets: &'a BTreeSet<NamespacedName>,
    target_group_arns: &'a BTreeMap<String, StringToken>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "gateway_lb_builder=debug,gwlb=debug,warn"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Command::Compile { bundle, pretty } => compile(bundle, pretty).await,
        Command::Crds => print_crds(),
    }
}

async fn compile(path: PathBuf, pretty: bool) -> anyhow::Result<()> {
    let (config, inventory, request) = Bundle::load(&path)?.into_parts();
    tracing::debug!(
        cluster = %config.cluster_name,
        vpc = %config.vpc_id,
        ports = request.routes_by_port.len(),
        "Bundle loaded"
    );

    let builder = GatewayModelBuilder::new(config, Providers::from_inventory(inventory));
    let output = builder
        .build(request)
        .await
        .with_context(|| format!("compiling {}", path.display()))?;

    let rendered = CompileOutput {
        stack: &output.stack,
        secrets: &output.secrets,
        target_group_arns: &output.target_group_arns_by_name,
    };
    let json = if pretty {
        serde_json::to_string_pretty(&rendered)?
    } else {
        serde_json::to_string(&rendered)?
    };
    println!("{json}");
    Ok(())
}

fn print_crds() -> anyhow::Result<()> {
    let crds = vec![
        LoadBalancerConfiguration::crd(),
        TargetGroupConfiguration::crd(),
        ListenerRuleConfiguration::crd(),
    ];
    println!("{}", serde_json::to_string_pretty(&crds)?);
    Ok(())
}
