use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use catalink_core::{
    AppConfig, CatalinkError, Database, DatabaseConfig, ExitCode, IdentityField, IncomingProduct,
    ProductField, ProductRecord, SimilarityMetric,
};
use catalink_resolve::{
    CreateOutcome, DuplicateGrouper, FieldMerger, MatchEvaluator, ResolveError,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "catalink",
    about = "Product catalogue matching, merging and duplicate audit",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting CATALINK_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Use this database file instead of the configured one.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Find stored products that may be the same item as a query record.
    Match {
        /// JSON file holding the query record ("-" for stdin).
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        barcode: Option<String>,
        #[arg(long)]
        ean: Option<String>,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        manufacturer: Option<String>,
        #[arg(long)]
        manufacturer_ref: Option<String>,
        /// Maximum number of candidates (defaults to matching.max_results).
        #[arg(long)]
        limit: Option<usize>,
        /// Override the configured similarity metric.
        #[arg(long)]
        similarity: Option<SimilarityMetric>,
    },

    /// Create a product, merging into the existing one if its identity is taken.
    Create {
        /// JSON file holding one product ("-" for stdin).
        file: String,
    },

    /// Create-or-merge every product of a JSON array.
    Import {
        /// JSON file holding an array of products ("-" for stdin).
        file: String,
    },

    /// List groups of products sharing an identity value.
    Duplicates {
        /// default_code, barcode or code_ean.
        #[arg(long, default_value = "default_code")]
        field: IdentityField,
        #[arg(long)]
        min_count: Option<usize>,
        #[arg(long, default_value = "0")]
        skip: usize,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one stored product.
    Show { id: String },

    /// Show store statistics.
    Stats,

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information.
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Write the default configuration file.
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Print the config file path.
    Path,
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let start = Instant::now();
    let cli = Cli::parse();

    let json_output = cli.json || std::env::var("CATALINK_JSON").as_deref() == Ok("1");

    let mut config = AppConfig::load()?;
    if let Some(db) = &cli.db {
        config.storage.database_path = db.to_string_lossy().to_string();
    }
    init_logging(&config);
    debug!(config = %AppConfig::config_path().display(), "config loaded");

    match cli.command {
        Commands::Match {
            file,
            barcode,
            ean,
            code,
            name,
            manufacturer,
            manufacturer_ref,
            limit,
            similarity,
        } => {
            let mut query: ProductRecord = match file {
                Some(path) => read_json(&path)?,
                None => ProductRecord::new(),
            };
            let flags = [
                (ProductField::Barcode, barcode),
                (ProductField::CodeEan, ean),
                (ProductField::DefaultCode, code),
                (ProductField::Name, name),
                (ProductField::Manufacturer, manufacturer),
                (ProductField::ManufacturerRef, manufacturer_ref),
            ];
            for (field, value) in flags {
                if let Some(value) = value {
                    query.set(field, value.into());
                }
            }
            if query.present_fields().is_empty() {
                fail(
                    json_output,
                    ExitCode::InvalidArgs,
                    "invalid_args",
                    "Give a query record with --file or at least one field flag",
                    &start,
                )?;
            }

            let mut matching = config.matching.clone();
            if let Some(metric) = similarity {
                matching.similarity = metric;
            }
            let max_results = limit.unwrap_or(matching.max_results);

            let db = open_db(&config)?;
            let results = MatchEvaluator::new(&db)
                .with_config(matching)
                .find_matches(&query, max_results);
            let results = match results {
                Ok(r) => r,
                Err(e) => return resolve_failure(json_output, e, &start),
            };
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": results, "total": results.len() },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if results.is_empty() {
                println!("No matching products.");
            } else {
                for r in &results {
                    println!(
                        "{id}  {score:.2}  {kind:<18}  {explanation}",
                        id = short_id(&r.candidate_id),
                        score = r.score,
                        kind = r.match_type.to_string(),
                        explanation = r.explanation,
                    );
                }
            }
        }

        Commands::Create { file } => {
            let incoming: IncomingProduct = read_json(&file)?;
            let db = open_db(&config)?;
            let merger = FieldMerger::new(&db)
                .with_default_confidence(config.merge.default_confidence);
            let outcome = merger.create_or_merge(&incoming);
            let dur = start.elapsed().as_millis();

            match outcome {
                CreateOutcome::Created(product) => {
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": { "outcome": "created", "product": product },
                            "meta": { "duration_ms": dur }
                        }))?;
                    } else {
                        println!("Created: {}", product.id);
                    }
                }
                CreateOutcome::Merged {
                    product,
                    fields_updated,
                } => {
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": {
                                "outcome": "merged",
                                "product": product,
                                "fields_updated": fields_updated,
                            },
                            "meta": { "duration_ms": dur }
                        }))?;
                    } else {
                        let names: Vec<&str> = fields_updated.iter().map(|f| f.as_str()).collect();
                        println!("Merged into {} (updated: {})", product.id, names.join(", "));
                    }
                }
                CreateOutcome::Failed(e) => return resolve_failure(json_output, e, &start),
            }
        }

        Commands::Import { file } => {
            let records: Vec<IncomingProduct> = read_json(&file)?;
            let db = open_db(&config)?;
            let report = FieldMerger::new(&db)
                .with_default_confidence(config.merge.default_confidence)
                .import_batch(&records);
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": report,
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!(
                    "Imported {} records: {} created, {} merged, {} failed",
                    report.total, report.created, report.merged, report.failed
                );
                for err in &report.errors {
                    let identity = err.identity.as_deref().unwrap_or("-");
                    eprintln!("  #{} ({identity}): {}", err.index, err.message);
                }
            }
        }

        Commands::Duplicates {
            field,
            min_count,
            skip,
            limit,
        } => {
            let min_count = min_count.unwrap_or(config.duplicates.min_count);
            let limit = limit.unwrap_or(config.duplicates.page_size);
            let db = open_db(&config)?;
            let found = DuplicateGrouper::new(&db)
                .with_field(field)
                .find_duplicate_groups(min_count, skip, limit);
            let (groups, total) = match found {
                Ok(page) => page,
                Err(e) => return resolve_failure(json_output, e, &start),
            };
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "items": groups,
                        "total": total,
                        "field": field.as_str(),
                        "skip": skip,
                        "limit": limit,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if groups.is_empty() {
                if db.identity_is_unique()? {
                    println!("No duplicates: {field} values are unique in this store.");
                } else {
                    println!("No duplicate {field} values.");
                }
            } else {
                println!("{total} groups share a {field} value:");
                for group in &groups {
                    println!("  {} ({} products)", group.identity_value, group.member_count);
                    for member in &group.members {
                        println!(
                            "    {}  {:<40}  {}",
                            short_id(&member.id),
                            member.name.as_deref().unwrap_or("-"),
                            member.created_at.format("%Y-%m-%d %H:%M"),
                        );
                    }
                }
            }
        }

        Commands::Show { id } => {
            let db = open_db(&config)?;
            let dur = start.elapsed().as_millis();
            match db.get_product(&id) {
                Ok(product) => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":product,"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", serde_json::to_string_pretty(&product)?);
                    }
                }
                Err(CatalinkError::ProductNotFound(_)) => {
                    fail(
                        json_output,
                        ExitCode::NotFound,
                        "not_found",
                        &format!("Product {id} not found"),
                        &start,
                    )?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Stats => {
            let db = open_db(&config)?;
            let stats = db.stats()?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":stats,"meta":{"duration_ms":dur}}))?;
            } else {
                println!("Store statistics:");
                println!("  Total products:    {}", stats.total);
                println!("  With default_code: {}", stats.with_default_code);
                println!("  With barcode:      {}", stats.with_barcode);
                println!("  With code_ean:     {}", stats.with_code_ean);
                println!("  Without identity:  {}", stats.without_identity);
                println!(
                    "  Status:            {} raw, {} enriched, {} validated, {} exported",
                    stats.raw, stats.enriched, stats.validated, stats.exported
                );
                println!("  With images:       {}", stats.with_images);
            }
        }

        Commands::Config { action } => {
            let path = AppConfig::config_path();
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::Show => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":config,"meta":{"duration_ms":dur}}))?;
                    } else {
                        print!("{}", toml::to_string_pretty(&config)?);
                    }
                }
                ConfigAction::Init { force } => {
                    if path.exists() && !force {
                        fail(
                            json_output,
                            ExitCode::Conflict,
                            "conflict",
                            &format!("{} already exists; pass --force to overwrite", path.display()),
                            &start,
                        )?;
                    }
                    AppConfig::default().save_to(&path)?;
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("Wrote {}", path.display());
                    }
                }
                ConfigAction::Path => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path,"exists":path.exists()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
            }
        }

        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"version":version},"meta":{"duration_ms":dur}}))?;
            } else {
                println!("catalink v{version}");
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn open_db(config: &AppConfig) -> Result<Database> {
    let db_path = config.database_path();
    let db_config = DatabaseConfig {
        unique_identity: config.storage.unique_identity,
    };
    Database::open_with(&db_path, &db_config)
        .with_context(|| format!("opening database {}", db_path.display()))
}

/// Read JSON from a file, or from stdin when `path` is "-".
fn read_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let contents = if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(Path::new(path)).with_context(|| format!("reading {path}"))?
    };
    serde_json::from_str(&contents).with_context(|| format!("parsing {path}"))
}

fn short_id(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Report a failure in the output format and exit with `code`.
fn fail(json_output: bool, code: ExitCode, kind: &str, message: &str, start: &Instant) -> Result<()> {
    let dur = start.elapsed().as_millis();
    if json_output {
        print_json(&serde_json::json!({
            "status": "error",
            "error": kind,
            "message": message,
            "meta": { "duration_ms": dur }
        }))?;
    } else {
        eprintln!("{message}");
    }
    std::process::exit(code as i32);
}

fn resolve_failure(json_output: bool, err: ResolveError, start: &Instant) -> Result<()> {
    let (code, kind) = match &err {
        ResolveError::NotFound { .. } => (ExitCode::NotFound, "not_found"),
        ResolveError::Validation(_) | ResolveError::InvalidGtin(_) => {
            (ExitCode::InvalidArgs, "invalid_args")
        }
        ResolveError::StoreConflict { .. } => (ExitCode::Conflict, "conflict"),
        ResolveError::Store(e) if e.is_transient() => (ExitCode::GeneralError, "store_busy"),
        ResolveError::Store(_) => (ExitCode::GeneralError, "store_error"),
    };
    fail(json_output, code, kind, &err.to_string(), start)
}
