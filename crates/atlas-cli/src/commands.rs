use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use bytes::Bytes;
use colored::Colorize;

use atlas_protocol::{DeployRequest, DeployStatus, HistoryParams};
use atlas_server::{AtlasServer, JournalSection, ServerConfig};
use atlas_types::{AuthChain, AuthLink, ContentHash, Entity, EntityKind, Pointer, Timestamp};

use crate::cli::*;
use crate::client::ApiClient;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Status(_) => cmd_status(&cli.server, &cli.format).await,
        Command::Deploy(args) => cmd_deploy(&cli.server, &cli.format, args).await,
        Command::Active(args) => cmd_active(&cli.server, &cli.format, args).await,
        Command::History(args) => cmd_history(&cli.server, &cli.format, cli.verbose, args).await,
        Command::Show(args) => cmd_show(&cli.server, &cli.format, args).await,
        Command::Audit(args) => cmd_audit(&cli.server, &cli.format, args).await,
        Command::Cat(args) => cmd_cat(&cli.server, args).await,
        Command::Servers(_) => cmd_servers(&cli.server, &cli.format).await,
        Command::Sync(_) => cmd_sync(&cli.server, &cli.format).await,
    }
}

fn json_mode(format: &OutputFormat) -> bool {
    matches!(format, OutputFormat::Json)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind.parse().context("parsing --bind address")?;
    }
    if let Some(name) = args.name {
        config.server_name = name;
    }
    if let Some(path) = args.journal {
        config.journal = Some(JournalSection {
            path,
            sync_every_write: false,
        });
    }
    config.sync.peers.extend(args.peers);

    let server = AtlasServer::new(config)?;
    server.serve().await?;
    Ok(())
}

async fn cmd_status(server: &str, format: &OutputFormat) -> anyhow::Result<()> {
    let info = ApiClient::new(server)?.info().await?;
    if json_mode(format) {
        return print_json(&info);
    }
    println!(
        "Server {} — protocol v{}, version {}",
        info.server_name.as_str().bold(),
        info.protocol_version,
        info.version
    );
    println!(
        "  entities: {} ({} active)",
        info.entities.to_string().bold(),
        info.active_entities
    );
    println!("  occupied pointers: {}", info.occupied_pointers);
    match info.latest_timestamp {
        Some(ts) => println!("  events: {}, latest at {}", info.events, ts),
        None => println!("  events: none"),
    }
    Ok(())
}

/// Split a `logical-name=path` file argument; a bare path is named after
/// its file name.
fn parse_file_arg(arg: &str) -> anyhow::Result<(String, String)> {
    if let Some((logical, path)) = arg.split_once('=') {
        if logical.is_empty() {
            bail!("empty logical name in file argument {arg:?}");
        }
        return Ok((logical.to_string(), path.to_string()));
    }
    let logical = Path::new(arg)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty());
    match logical {
        Some(logical) => Ok((logical, arg.to_string())),
        None => bail!("cannot derive a logical name from {arg:?}"),
    }
}

fn parse_auth_arg(arg: &str) -> anyhow::Result<AuthLink> {
    match arg.split_once('=') {
        Some((signer, signature)) if !signer.is_empty() => {
            Ok(AuthLink::new(signer, signature))
        }
        _ => bail!("auth link must be `signer=signature`, got {arg:?}"),
    }
}

async fn cmd_deploy(server: &str, format: &OutputFormat, args: DeployArgs) -> anyhow::Result<()> {
    let kind = EntityKind::new(args.kind)?;
    let mut pointers = std::collections::BTreeSet::new();
    for raw in &args.pointers {
        pointers.insert(Pointer::new(raw.as_str())?);
    }

    let mut files: BTreeMap<String, Bytes> = BTreeMap::new();
    let mut content = BTreeMap::new();
    for arg in &args.files {
        let (logical, path) = parse_file_arg(arg)?;
        let bytes = Bytes::from(
            std::fs::read(&path).with_context(|| format!("reading content file {path}"))?,
        );
        content.insert(logical.clone(), ContentHash::of(&bytes));
        files.insert(logical, bytes);
    }

    let metadata = match &args.metadata {
        Some(raw) => serde_json::from_str(raw).context("parsing --metadata as JSON")?,
        None => serde_json::json!({}),
    };
    let timestamp = match args.timestamp {
        Some(millis) => Timestamp::from_millis(millis),
        None => Timestamp::now(),
    };
    let links = args
        .auth
        .iter()
        .map(|arg| parse_auth_arg(arg))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let entity = Entity::new(kind, pointers, timestamp, content, metadata)?;
    let request = DeployRequest::new(entity, files, AuthChain::new(links));
    let response = ApiClient::new(server)?.deploy(&request).await?;

    if json_mode(format) {
        return print_json(&response);
    }
    match &response.outcome {
        DeployStatus::Applied { superseded } => {
            println!(
                "{} Deployed {} at {}",
                "✓".green().bold(),
                response.entity_id.short_hex().yellow(),
                response.timestamp
            );
            for id in superseded {
                println!("  superseded {}", id.short_hex().dimmed());
            }
        }
        DeployStatus::Superseded { by, retired } => {
            println!(
                "{} Recorded {} but a newer deployment holds its pointers",
                "!".yellow().bold(),
                response.entity_id.short_hex().yellow()
            );
            for id in by {
                println!("  blocked by {}", id.short_hex().bold());
            }
            for id in retired {
                println!("  retired {}", id.short_hex().dimmed());
            }
        }
        DeployStatus::AlreadyKnown => {
            println!(
                "{} {} was already deployed",
                "=".dimmed(),
                response.entity_id.short_hex().yellow()
            );
        }
    }
    Ok(())
}

async fn cmd_active(server: &str, format: &OutputFormat, args: ActiveArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(server)?;
    match (&args.kind, &args.pointer) {
        (Some(kind), Some(pointer)) => {
            let id = client.active_id(kind, pointer).await?;
            if json_mode(format) {
                return print_json(&id);
            }
            println!("{}", id.to_hex());
        }
        (Some(kind), None) => {
            let map = client.active_for_kind(kind).await?;
            if json_mode(format) {
                return print_json(&map);
            }
            print_pointer_map(&map);
        }
        (None, Some(_)) => bail!("--pointer needs a kind, e.g. `atlas active scene -p 12,4`"),
        (None, None) => {
            let map = client.active_map().await?;
            if json_mode(format) {
                return print_json(&map);
            }
            let Some(kinds) = map.as_object() else {
                bail!("unexpected active map shape");
            };
            if kinds.is_empty() {
                println!("No active entities.");
            }
            for (kind, pointers) in kinds {
                println!("{}", kind.cyan().bold());
                print_pointer_map(pointers);
            }
        }
    }
    Ok(())
}

fn print_pointer_map(map: &serde_json::Value) {
    let Some(entries) = map.as_object() else {
        return;
    };
    for (pointer, id) in entries {
        let id = id.as_str().unwrap_or_default();
        println!("  {} {}", pointer.bold(), short(id).yellow());
    }
}

fn short(hex: &str) -> &str {
    &hex[..hex.len().min(8)]
}

async fn cmd_history(
    server: &str,
    format: &OutputFormat,
    verbose: bool,
    args: HistoryArgs,
) -> anyhow::Result<()> {
    let params = HistoryParams {
        from: args.from,
        to: args.to,
        offset: args.offset,
        limit: Some(args.limit),
    };
    let page = ApiClient::new(server)?.history(&params).await?;
    if json_mode(format) {
        return print_json(&page);
    }
    if page.events.is_empty() {
        println!("No deployments in this window.");
        return Ok(());
    }
    for event in &page.events {
        let id = if verbose {
            event.entity_id.to_hex()
        } else {
            event.entity_id.short_hex()
        };
        println!(
            "{}  {}  {}  via {}",
            event.timestamp.to_string().dimmed(),
            event.kind.as_str().cyan(),
            id.yellow(),
            event.server_name.as_str().bold()
        );
    }
    Ok(())
}

async fn cmd_show(server: &str, format: &OutputFormat, args: ShowArgs) -> anyhow::Result<()> {
    let client = ApiClient::new(server)?;
    let entity = client.entity(&args.id).await?;
    let audits = client.audits(&args.id).await?;
    if json_mode(format) {
        return print_json(&serde_json::json!({ "entity": entity, "audits": audits }));
    }

    println!(
        "{} {} {}",
        entity.kind.as_str().cyan().bold(),
        entity.id.short_hex().yellow().bold(),
        format!("(authored {})", entity.timestamp).dimmed()
    );
    for pointer in &entity.pointers {
        println!("  pointer {}", pointer.as_str().bold());
    }
    for (name, hash) in &entity.content {
        println!("  file {} {}", name, hash.short_hex().yellow());
    }
    if !entity.metadata.is_null() && entity.metadata != serde_json::json!({}) {
        println!("  metadata {}", entity.metadata);
    }
    for audit in &audits {
        println!(
            "  deployed via {} at {} (seen locally {})",
            audit.origin_server.as_str().bold(),
            audit.origin_timestamp,
            audit.local_timestamp.to_string().dimmed()
        );
    }
    Ok(())
}

async fn cmd_audit(server: &str, format: &OutputFormat, args: AuditArgs) -> anyhow::Result<()> {
    let audits = ApiClient::new(server)?.audits(&args.id).await?;
    if json_mode(format) {
        return print_json(&audits);
    }
    for audit in &audits {
        println!(
            "{} {} via {} at {}, {} auth link(s)",
            audit.kind.as_str().cyan(),
            audit.entity_id.short_hex().yellow(),
            audit.origin_server.as_str().bold(),
            audit.origin_timestamp,
            audit.auth_chain.len()
        );
    }
    Ok(())
}

async fn cmd_cat(server: &str, args: CatArgs) -> anyhow::Result<()> {
    let bytes = ApiClient::new(server)?.content(&args.hash).await?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "{} {} bytes to {}",
                "✓".green(),
                bytes.len(),
                path.display()
            );
        }
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}

async fn cmd_servers(server: &str, format: &OutputFormat) -> anyhow::Result<()> {
    let records = ApiClient::new(server)?.servers().await?;
    if json_mode(format) {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No servers registered.");
        return Ok(());
    }
    for record in &records {
        println!(
            "{}  {}",
            record.server_name.as_str().bold(),
            record.address.as_str().blue()
        );
    }
    Ok(())
}

async fn cmd_sync(server: &str, format: &OutputFormat) -> anyhow::Result<()> {
    let report = ApiClient::new(server)?.sync().await?;
    if json_mode(format) {
        return print_json(&report);
    }
    println!(
        "{} Cycle done: {} peers polled, {} failed, {} abandoned",
        "✓".green().bold(),
        report.peers_polled,
        report.peers_failed,
        report.peers_abandoned
    );
    println!(
        "  events {}: applied {}, stale {}, duplicates {}, rejected {}, held back {}",
        report.events_seen,
        report.applied.to_string().green(),
        report.stale,
        report.duplicates,
        report.rejected,
        report.held_back
    );
    Ok(())
}
