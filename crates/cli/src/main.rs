use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use palate_api::{HttpApi, PalateApi, RecommendRequest};
use palate_core::transform::to_match_results;
use palate_core::{AppData, RecipeRef};
use palate_store::{AllergenStore, FetchState, RecipeResolver};

#[derive(Parser, Debug)]
#[command(name = "palatectl", version, about = "Palate CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Service base URL (default: PALATE_API_URL, then http://127.0.0.1:5000)
    #[arg(long = "api-url", global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the backing service answers
    Health,
    /// Fetch the bootstrap payload and summarize its catalogs
    Data,
    /// Rank target-cuisine dishes against a comfort dish
    Recommend {
        /// Comfort dish to translate, e.g. "Khichdi"
        dish: String,
        /// Target cuisine, e.g. "Thai"
        #[arg(long = "cuisine")]
        cuisine: String,
        /// Allergen to exclude (repeatable)
        #[arg(long = "exclude", action = ArgAction::Append)]
        exclude: Vec<String>,
    },
    /// Resolve cooking instructions, id tier first with a title fallback
    Recipe {
        /// Numeric recipe id
        #[arg(long = "id")]
        id: Option<i64>,
        /// Exact recipe title
        #[arg(long = "title")]
        title: Option<String>,
    },
    /// Full-text recipe search
    Search {
        /// Query string
        query: String,
    },
    /// Substitute suggestions for one allergen
    Substitutes {
        /// Allergen name, e.g. "Dairy"
        allergen: String,
    },
}

fn init_tracing() {
    let env = std::env::var("PALATE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("PALATE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid PALATE_METRICS_ADDR; expected host:port");
        }
    }
}

/// Bootstrap payload, with an actionable message when the service is down.
async fn fetch_data(api: &Arc<dyn PalateApi>, base: &str) -> Result<AppData> {
    match api.fetch_app_data().await {
        Ok(d) => Ok(d),
        Err(e) => {
            error!(error = ?e, "data fetch failed");
            bail!("could not load app data from {}: {} (is the palate service running?)", base, e)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let api = match cli.api_url.as_deref() {
        Some(url) => HttpApi::new(url),
        None => HttpApi::from_env(),
    }
    .context("building http client")?;
    let base = api.base_url().to_string();
    let api: Arc<dyn PalateApi> = Arc::new(api);

    match cli.command {
        Commands::Health => {
            info!("health invoked");
            match api.health().await {
                Ok(h) => match cli.output {
                    Output::Human => println!("{} • {}", h.status, h.service),
                    Output::Json => println!("{}", serde_json::to_string_pretty(&h)?),
                },
                Err(e) => {
                    error!(error = ?e, "health failed");
                    bail!("{} did not answer: {} (is the palate service running?)", base, e);
                }
            }
        }
        Commands::Data => {
            info!("data invoked");
            let data = fetch_data(&api, &base).await?;
            match cli.output {
                Output::Human => {
                    println!("comfort cuisines: {}", data.comfort_cuisines.join(", "));
                    println!("target cuisines:  {}", data.target_cuisines.join(", "));
                    println!("common allergens: {}", data.common_allergens.join(", "));
                    println!("known recipes:    {}", data.recipes.len());
                    println!("restaurants:      {}", data.restaurants.len());
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&data)?),
            }
        }
        Commands::Recommend { dish, cuisine, exclude } => {
            info!(dish = %dish, cuisine = %cuisine, excluded = exclude.len(), "recommend invoked");
            let data = fetch_data(&api, &base).await?;
            let req = RecommendRequest {
                comfort_dish: dish,
                target_cuisine: cuisine,
                excluded_allergens: exclude,
            };
            let candidates = match api.recommend(&req).await {
                Ok(c) => c,
                Err(e) => {
                    error!(error = ?e, "recommend failed");
                    bail!("recommend failed: {}", e);
                }
            };
            let results = to_match_results(candidates, &data.recipes);
            match cli.output {
                Output::Human => {
                    println!("ID  MATCH  RECIPE  DISH                         WHY");
                    for r in &results {
                        let recipe = if r.has_recipe { "yes" } else { "-" };
                        println!(
                            "{:<3} {:>4}%  {:<6} {:<28} {}",
                            r.id, r.match_score_percent, recipe, r.name, r.explanation
                        );
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            }
        }
        Commands::Recipe { id, title } => {
            let reference = RecipeRef { id, title };
            if reference.is_empty() {
                bail!("recipe needs --id or --title");
            }
            info!(reference = %reference.label(), "recipe invoked");
            let resolver = RecipeResolver::new(api.clone());
            let steps = match resolver.resolve(&reference).await {
                Ok(s) => s,
                Err(e) => {
                    error!(error = ?e, "resolve failed");
                    bail!("resolve failed: {}", e);
                }
            };
            match cli.output {
                Output::Human => {
                    if steps.instructions.is_empty() {
                        println!("no instructions on record for {}", reference.label());
                    } else {
                        for (i, step) in steps.instructions.iter().enumerate() {
                            println!("{:>2}. {}", i + 1, step);
                        }
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&steps)?),
            }
        }
        Commands::Search { query } => {
            info!(query = %query, "search invoked");
            let rows = match api.search_recipes(&query).await {
                Ok(r) => r,
                Err(e) => {
                    error!(error = ?e, "search failed");
                    bail!("search failed: {}", e);
                }
            };
            match cli.output {
                Output::Human => {
                    println!("ID     REGION          TITLE");
                    for r in &rows {
                        let region = r.region.as_deref().unwrap_or("-");
                        println!("{:<6} {:<15} {}", r.id, region, r.title);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
            }
        }
        Commands::Substitutes { allergen } => {
            info!(allergen = %allergen, "substitutes invoked");
            let store = AllergenStore::new(api.clone());
            store.toggle(&allergen);
            let wait_secs = std::env::var("PALATE_WAIT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(8);
            let outcome =
                tokio::time::timeout(Duration::from_secs(wait_secs), store.wait_settled(&allergen))
                    .await;
            match outcome {
                Ok(FetchState::Ready(set)) => match cli.output {
                    Output::Human => {
                        println!("category: {} (matched {})", set.category, set.matched_entity);
                        if set.substitutes.is_empty() {
                            println!("substitutes: (none)");
                        }
                        for s in &set.substitutes {
                            match s.link.as_deref() {
                                Some(link) => println!("- {}: {} ({})", s.name, s.description, link),
                                None => println!("- {}: {}", s.name, s.description),
                            }
                        }
                    }
                    Output::Json => println!("{}", serde_json::to_string_pretty(&set)?),
                },
                Ok(FetchState::Error(e)) => bail!("substitute lookup failed: {}", e),
                Ok(_) => bail!("substitute lookup never settled"),
                Err(_) => bail!("substitute lookup timed out after {}s", wait_secs),
            }
        }
    }

    Ok(())
}
