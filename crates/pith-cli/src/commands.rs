use std::fs::File;
use std::io::{self, BufReader, BufWriter};

use anyhow::{bail, Context};
use colored::Colorize;
use pith_backend::{
    Backend, ObjectMeta, PurgeScope, QuotaLimits, QuotaScope, VersionSelector,
};
use pith_identity::{IdentityClient, IdentityProvider};
use pith_types::ObjectPath;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::cli::*;
use crate::config::CliConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Put(args) => cmd_put(&open_backend(&config)?, format, args),
        Command::Get(args) => cmd_get(&open_backend(&config)?, format, args),
        Command::Rm(args) => cmd_rm(&open_backend(&config)?, format, args),
        Command::Cp(args) => cmd_cp(&open_backend(&config)?, format, args),
        Command::Versions(args) => cmd_versions(&open_backend(&config)?, format, args),
        Command::Ls(args) => cmd_ls(&open_backend(&config)?, format, args),
        Command::Usage(args) => cmd_usage(&open_backend(&config)?, format, args),
        Command::Quota(args) => cmd_quota(&open_backend(&config)?, format, args),
        Command::Purge(args) => cmd_purge(&open_backend(&config)?, format, args),
        Command::Gc => cmd_gc(&open_backend(&config)?, format),
        Command::Publish(args) => cmd_publish(&open_backend(&config)?, format, args),
        Command::Unpublish(args) => cmd_unpublish(&open_backend(&config)?, format, args),
        Command::Whoami(args) => cmd_whoami(&config, format, args),
        Command::Uuid(args) => cmd_lookup(&config, format, args, Lookup::Uuid),
        Command::Name(args) => cmd_lookup(&config, format, args, Lookup::Name),
    }
}

fn open_backend(config: &CliConfig) -> anyhow::Result<Backend> {
    if config.backend.block_path.is_none() {
        warn!("no block_path configured; objects live in memory and are lost on exit");
    }
    let backend = Backend::open(config.backend.clone()).context("opening backend")?;
    let missing = &backend.recovery().missing_blocks;
    if !missing.is_empty() {
        eprintln!(
            "{} {} journaled blocks are missing from the block store",
            "warning:".yellow().bold(),
            missing.len()
        );
    }
    Ok(backend)
}

fn parse_path(s: &str) -> anyhow::Result<ObjectPath> {
    s.parse::<ObjectPath>()
        .with_context(|| format!("invalid object path {s:?}; expected account/container/name"))
}

fn scope(account: &str, container: Option<&str>) -> QuotaScope {
    match container {
        Some(container) => QuotaScope::Container(account.to_string(), container.to_string()),
        None => QuotaScope::Account(account.to_string()),
    }
}

fn object_meta(content_type: Option<String>, entries: &[String]) -> anyhow::Result<ObjectMeta> {
    let mut meta = content_type.map_or_else(ObjectMeta::default, ObjectMeta::new);
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("metadata must be KEY=VALUE, got {entry:?}");
        };
        if key.is_empty() {
            bail!("metadata key is empty in {entry:?}");
        }
        meta = meta.with(key, value);
    }
    Ok(meta)
}

fn purge_scope(args: &PurgeArgs) -> PurgeScope {
    match (args.before, args.keep, args.all) {
        (Some(ms), _, _) => PurgeScope::Before(ms),
        (None, Some(n), _) => PurgeScope::KeepLatest(n),
        (None, None, true) => PurgeScope::All,
        (None, None, false) => PurgeScope::AllButCurrent,
    }
}

/// Overlay requested limits on the current ones; `0` lifts a limit.
fn merged_limits(current: QuotaLimits, max_bytes: Option<u64>, max_objects: Option<u64>) -> QuotaLimits {
    QuotaLimits {
        max_bytes: max_bytes.map_or(current.max_bytes, |b| (b > 0).then_some(b)),
        max_objects: max_objects.map_or(current.max_objects, |n| (n > 0).then_some(n)),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn limit(value: Option<u64>) -> String {
    value.map_or_else(|| "unlimited".to_string(), |v| v.to_string())
}

// ---- Objects ----

fn cmd_put(backend: &Backend, format: OutputFormat, args: PutArgs) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let meta = object_meta(args.content_type, &args.meta)?;

    let version = match &args.file {
        Some(file) => {
            let reader = File::open(file).with_context(|| format!("opening {}", file.display()))?;
            backend.put_object(&path, BufReader::new(reader), meta)?
        }
        None => backend.put_object(&path, io::stdin().lock(), meta)?,
    };

    match format {
        OutputFormat::Json => print_json(&version)?,
        OutputFormat::Text => println!(
            "{} Stored {} serial {} ({} bytes, etag {})",
            "✓".green().bold(),
            path.to_string().bold(),
            version.serial.to_string().yellow(),
            version.size,
            version.etag().short_hex().cyan()
        ),
    }
    Ok(())
}

fn cmd_get(backend: &Backend, format: OutputFormat, args: GetArgs) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let selector = match (args.serial, args.as_of) {
        (Some(serial), _) => VersionSelector::Serial(serial),
        (None, Some(ms)) => VersionSelector::AsOf(ms),
        (None, None) => VersionSelector::Current,
    };

    let Some(output) = &args.output else {
        backend.read_object(&path, selector, io::stdout().lock())?;
        return Ok(());
    };
    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let version = backend.read_object(&path, selector, BufWriter::new(file))?;
    match format {
        OutputFormat::Json => print_json(&version)?,
        OutputFormat::Text => println!(
            "{} Wrote {} serial {} ({} bytes) to {}",
            "✓".green().bold(),
            path.to_string().bold(),
            version.serial.to_string().yellow(),
            version.size,
            output.display()
        ),
    }
    Ok(())
}

fn cmd_rm(backend: &Backend, format: OutputFormat, args: PathArg) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let tombstone = backend.delete_object(&path)?;
    match format {
        OutputFormat::Json => print_json(&tombstone)?,
        OutputFormat::Text => println!(
            "{} Deleted {} (tombstone serial {})",
            "✓".green().bold(),
            path.to_string().bold(),
            tombstone.serial.to_string().yellow()
        ),
    }
    Ok(())
}

fn cmd_cp(backend: &Backend, format: OutputFormat, args: CpArgs) -> anyhow::Result<()> {
    let src = parse_path(&args.src)?;
    let dst = parse_path(&args.dst)?;
    let version = backend.copy_object(&src, &dst)?;
    match format {
        OutputFormat::Json => print_json(&version)?,
        OutputFormat::Text => println!(
            "{} Copied {} → {} serial {}",
            "✓".green().bold(),
            src.to_string().bold(),
            dst.to_string().bold(),
            version.serial.to_string().yellow()
        ),
    }
    Ok(())
}

fn cmd_versions(backend: &Backend, format: OutputFormat, args: PathArg) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let versions = backend.list_versions(&path)?;
    match format {
        OutputFormat::Json => print_json(&versions)?,
        OutputFormat::Text => {
            if versions.is_empty() {
                println!("No versions of {}.", path.to_string().bold());
            }
            for v in &versions {
                let state = if v.deleted { "deleted".red() } else { "live".green() };
                println!(
                    "{:>6}  {:>12}  {}  {}  {}",
                    v.serial.to_string().yellow(),
                    v.size,
                    v.modified,
                    v.etag().short_hex().dimmed(),
                    state
                );
            }
        }
    }
    Ok(())
}

fn cmd_ls(backend: &Backend, format: OutputFormat, args: ScopeArgs) -> anyhow::Result<()> {
    let Some(container) = &args.container else {
        let containers = backend.list_containers(&args.account)?;
        match format {
            OutputFormat::Json => print_json(&containers)?,
            OutputFormat::Text => {
                for name in &containers {
                    println!("{}/", name.blue().bold());
                }
            }
        }
        return Ok(());
    };
    let objects = backend.list_objects(&args.account, container)?;
    match format {
        OutputFormat::Json => print_json(&objects)?,
        OutputFormat::Text => {
            for v in &objects {
                println!(
                    "{:>12}  {:>6}  {}  {}",
                    v.size,
                    v.serial.to_string().yellow(),
                    v.meta.content_type.dimmed(),
                    v.path.name
                );
            }
        }
    }
    Ok(())
}

// ---- Quota ----

fn print_usage(backend: &Backend, format: OutputFormat, scope: &QuotaScope) -> anyhow::Result<()> {
    let usage = backend.usage(scope)?;
    let limits = backend.limits(scope)?;
    match format {
        OutputFormat::Json => print_json(&json!({
            "scope": scope.to_string(),
            "usage": usage,
            "limits": limits,
        }))?,
        OutputFormat::Text => {
            println!("{}", scope.to_string().bold());
            println!("  bytes:   {} / {}", usage.bytes.to_string().cyan(), limit(limits.max_bytes));
            println!("  objects: {} / {}", usage.objects.to_string().cyan(), limit(limits.max_objects));
        }
    }
    Ok(())
}

fn cmd_usage(backend: &Backend, format: OutputFormat, args: ScopeArgs) -> anyhow::Result<()> {
    print_usage(backend, format, &scope(&args.account, args.container.as_deref()))
}

fn cmd_quota(backend: &Backend, format: OutputFormat, args: QuotaArgs) -> anyhow::Result<()> {
    let scope = scope(&args.account, args.container.as_deref());
    if args.max_bytes.is_some() || args.max_objects.is_some() {
        let limits = merged_limits(backend.limits(&scope)?, args.max_bytes, args.max_objects);
        backend.set_limits(&scope, limits)?;
        if format == OutputFormat::Text {
            println!("{} Limits updated", "✓".green().bold());
        }
    }
    print_usage(backend, format, &scope)
}

// ---- Garbage collection ----

fn cmd_purge(backend: &Backend, format: OutputFormat, args: PurgeArgs) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let report = backend.purge_history(&path, purge_scope(&args))?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => println!(
            "{} Purged {} versions of {} ({} bytes)",
            "✓".green().bold(),
            report.serials.len().to_string().yellow(),
            path.to_string().bold(),
            report.bytes
        ),
    }
    Ok(())
}

fn cmd_gc(backend: &Backend, format: OutputFormat) -> anyhow::Result<()> {
    let report = backend.reclaim_blocks()?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => println!(
            "{} GC: {} of {} blocks removed, {} bytes freed",
            "✓".green(),
            report.reclaimed.to_string().yellow(),
            report.examined,
            report.bytes_freed
        ),
    }
    Ok(())
}

// ---- Public URLs ----

fn cmd_publish(backend: &Backend, format: OutputFormat, args: PathArg) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let token = backend.set_public(&path)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "path": path, "token": token }))?,
        OutputFormat::Text => println!(
            "{} {} is public as {}",
            "✓".green().bold(),
            path.to_string().bold(),
            token.cyan()
        ),
    }
    Ok(())
}

fn cmd_unpublish(backend: &Backend, format: OutputFormat, args: PathArg) -> anyhow::Result<()> {
    let path = parse_path(&args.path)?;
    let cleared = backend.clear_public(&path)?;
    match format {
        OutputFormat::Json => print_json(&json!({ "path": path, "cleared": cleared }))?,
        OutputFormat::Text if cleared => {
            println!("{} {} is no longer public", "✓".green().bold(), path.to_string().bold())
        }
        OutputFormat::Text => println!("{} was not public", path.to_string().bold()),
    }
    Ok(())
}

// ---- Identity ----

#[derive(Clone, Copy)]
enum Lookup {
    Uuid,
    Name,
}

fn identity_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")
}

fn cmd_whoami(config: &CliConfig, format: OutputFormat, args: WhoamiArgs) -> anyhow::Result<()> {
    let client = IdentityClient::new(config.identity()?)?;
    let user = identity_runtime()?.block_on(client.authenticate(&args.token, args.usage))?;
    match format {
        OutputFormat::Json => print_json(&user)?,
        OutputFormat::Text => {
            println!("{} ({})", user.username.bold(), user.uuid.dimmed());
            for resource in &user.usage {
                println!("  {}: {}", resource.display_name, resource.current.to_string().cyan());
            }
        }
    }
    Ok(())
}

fn cmd_lookup(
    config: &CliConfig,
    format: OutputFormat,
    args: LookupArgs,
    lookup: Lookup,
) -> anyhow::Result<()> {
    let client = IdentityClient::new(config.identity()?)?;
    let runtime = identity_runtime()?;
    let answer = runtime.block_on(async {
        match (lookup, args.service) {
            (Lookup::Uuid, false) => client.uuid(&args.token, &args.value).await,
            (Lookup::Uuid, true) => client.service_uuid(&args.token, &args.value).await,
            (Lookup::Name, false) => client.username(&args.token, &args.value).await,
            (Lookup::Name, true) => client.service_username(&args.token, &args.value).await,
        }
    })?;
    match format {
        OutputFormat::Json => print_json(&json!({ "query": args.value, "result": answer }))?,
        OutputFormat::Text => println!("{answer}"),
    }
    Ok(())
}
