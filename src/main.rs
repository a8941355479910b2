use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing_subscriber::EnvFilter;

use tourist_forge::distribution::DistributionSweep;
use tourist_forge::forge::{ForgeJob, HourlyProfiles, disaggregate, forge, forge_batch};
use tourist_forge::importance::{
    EliminatedVariables, TrainedImportance, inner_join, normalize_columns, point_biserial,
    reconcile, theoretical_importance,
};
use tourist_forge::{AggregateRow, DistributionModel, ForgeSettings, PaxAccounting, RuleTable, io};

#[derive(Parser, Debug)]
#[command(name = "tourist-forge", version, about = "Forge guest-level hotel consumption from aggregate statistics")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

/// Inputs shared by every command.
#[derive(clap::Args, Debug, Clone)]
struct Inputs {
    /// Aggregate dataset (CSV)
    #[arg(long)]
    data: PathBuf,

    /// Rule table (JSON)
    #[arg(long)]
    rules: PathBuf,

    /// Keep only rows of this hotel
    #[arg(long)]
    hotel: Option<String>,

    /// Output directory
    #[arg(long, default_value = "output")]
    out: PathBuf,
}

/// Overrides on top of the FORGE_* environment settings.
#[derive(clap::Args, Debug, Clone)]
struct Overrides {
    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Relative noise on mean consumption
    #[arg(long)]
    noise: Option<f64>,

    /// Longest stay in days
    #[arg(long)]
    max_stay_days: Option<u32>,

    /// Pax bookkeeping: headcount or occupant_days
    #[arg(long)]
    pax_accounting: Option<PaxAccounting>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forge guests (and optionally hourly records) from one distribution
    Forge {
        #[command(flatten)]
        inputs: Inputs,

        /// Distribution model (JSON)
        #[arg(long)]
        dist: PathBuf,

        /// Hourly profiles (JSON); enables hourly disaggregation
        #[arg(long)]
        profiles: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Forge one dataset per variant of a sweep template, in parallel
    Sweep {
        #[command(flatten)]
        inputs: Inputs,

        /// Sweep template (JSON distribution with candidate lists)
        #[arg(long)]
        dist: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Compute theoretical importance and reconcile it with trained results
    Importance {
        #[command(flatten)]
        inputs: Inputs,

        /// Distribution model (JSON)
        #[arg(long)]
        dist: PathBuf,

        /// Trained importance table (CSV, first column Feature)
        #[arg(long)]
        trained: Option<PathBuf>,

        /// Features eliminated during training (JSON)
        #[arg(long, requires = "trained")]
        eliminated: Option<PathBuf>,

        /// Forged guest dataset (CSV); adds the correlation baseline
        #[arg(long)]
        guests: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match cli.command {
        Command::Forge {
            inputs,
            dist,
            profiles,
            overrides,
        } => run_forge(&inputs, &dist, profiles.as_deref(), &overrides),
        Command::Sweep {
            inputs,
            dist,
            overrides,
        } => run_sweep(&inputs, &dist, &overrides).await,
        Command::Importance {
            inputs,
            dist,
            trained,
            eliminated,
            guests,
        } => run_importance(
            &inputs,
            &dist,
            trained.as_deref(),
            eliminated.as_deref(),
            guests.as_deref(),
        ),
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn settings(overrides: &Overrides) -> anyhow::Result<ForgeSettings> {
    let mut settings = ForgeSettings::from_env().context("Invalid FORGE_* settings")?;
    if let Some(seed) = overrides.seed {
        settings = settings.with_seed(seed);
    }
    if let Some(noise) = overrides.noise {
        settings = settings.with_noise(noise);
    }
    if let Some(days) = overrides.max_stay_days {
        settings = settings.with_max_stay_days(days);
    }
    if let Some(policy) = overrides.pax_accounting {
        settings = settings.with_pax_accounting(policy);
    }
    settings.validate()?;
    Ok(settings)
}

fn load_rows(inputs: &Inputs, settings: &ForgeSettings) -> anyhow::Result<Vec<AggregateRow>> {
    io::read_aggregate(&inputs.data, &settings.columns, inputs.hotel.as_deref())
        .with_context(|| format!("Failed to read aggregate data from {}", inputs.data.display()))
}

fn load_model(path: &Path, tolerance: f64) -> anyhow::Result<DistributionModel> {
    let doc = io::read_json(path)?;
    let model = DistributionModel::from_json(&doc)
        .with_context(|| format!("Invalid distribution in {}", path.display()))?;
    Ok(model.normalized(tolerance).model)
}

fn load_rules(path: &Path) -> anyhow::Result<RuleTable> {
    let doc = io::read_json(path)?;
    RuleTable::from_json(&doc).with_context(|| format!("Invalid rule table in {}", path.display()))
}

fn create_dir(path: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(path).with_context(|| format!("Cannot create {}", path.display()))
}

fn run_forge(
    inputs: &Inputs,
    dist: &Path,
    profiles: Option<&Path>,
    overrides: &Overrides,
) -> anyhow::Result<()> {
    let settings = settings(overrides)?;
    let rows = load_rows(inputs, &settings)?;
    let model = load_model(dist, settings.tolerance)?;
    let rules = load_rules(&inputs.rules)?;
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let output = forge(&rows, &model, &rules, &settings, &mut rng)?;

    let out = &inputs.out;
    create_dir(out)?;
    io::write_guests(&out.join("guests.csv"), &output.guests, &model)?;
    io::write_json(&out.join("calibration.json"), &output.calibration)?;
    io::write_json(&out.join("metadata.json"), &output.metadata)?;
    io::write_json(&out.join("failures.json"), &output.failures)?;
    io::write_json(&out.join("distribution.json"), &model.to_json())?;
    io::write_json(&out.join("rules.json"), &rules.to_json())?;

    match theoretical_importance(&rules, &model, &rows) {
        Ok(theoretical) => {
            let correlation = point_biserial(&output.guests)?;
            let combined = normalize_columns(&inner_join(&theoretical, &correlation)?);
            io::write_importance(&out.join("importance.csv"), &combined)?;
        }
        Err(e) => tracing::warn!("Theoretical importance not computed: {}", e),
    }

    if let Some(path) = profiles {
        let doc = io::read_json(path)?;
        let profiles = HourlyProfiles::from_json(&doc, settings.tolerance)
            .with_context(|| format!("Invalid hourly profiles in {}", path.display()))?;
        let hourly = disaggregate(&output.guests, &profiles, settings.daily_noise, &mut rng)?;
        io::write_hourly(&out.join("hourly.csv"), &hourly.records)?;
        io::write_json(&out.join("hourly_metadata.json"), &hourly.metadata)?;
    }

    if !output.failures.is_empty() {
        tracing::warn!(
            failed = output.failures.len(),
            "Some rows could not be forged, see failures.json"
        );
    }
    Ok(())
}

async fn run_sweep(inputs: &Inputs, template: &Path, overrides: &Overrides) -> anyhow::Result<()> {
    let settings = settings(overrides)?;
    let rows = Arc::new(load_rows(inputs, &settings)?);
    let rules = Arc::new(load_rules(&inputs.rules)?);

    let doc = io::read_json(template)?;
    let sweep = DistributionSweep::from_json(&doc)
        .with_context(|| format!("Invalid sweep template in {}", template.display()))?;
    tracing::info!(variants = sweep.len(), "Expanded sweep template");

    let mut jobs = Vec::with_capacity(sweep.len());
    for (index, variant) in sweep.variants().enumerate() {
        let model = DistributionModel::from_json(&variant)
            .with_context(|| format!("Sweep variant {} is not a valid distribution", index))?;
        jobs.push(ForgeJob {
            label: format!("variant_{:04}", index),
            model: Arc::new(model.normalized(settings.tolerance).model),
            rules: Arc::clone(&rules),
            rows: Arc::clone(&rows),
        });
    }

    let models: Vec<Arc<DistributionModel>> = jobs.iter().map(|j| Arc::clone(&j.model)).collect();
    let results = forge_batch(jobs, &settings).await;

    create_dir(&inputs.out)?;
    let mut failed = 0;
    for result in results {
        let dir = inputs.out.join(&result.label);
        match result.result {
            Ok(output) => {
                create_dir(&dir)?;
                let model = &models[result.index];
                io::write_guests(&dir.join("guests.csv"), &output.guests, model)?;
                io::write_json(&dir.join("calibration.json"), &output.calibration)?;
                io::write_json(&dir.join("metadata.json"), &output.metadata)?;
                io::write_json(&dir.join("failures.json"), &output.failures)?;
                io::write_json(&dir.join("distribution.json"), &model.to_json())?;
            }
            Err(e) => {
                failed += 1;
                tracing::error!(variant = %result.label, "Variant failed: {}", e);
            }
        }
    }
    io::write_json(&inputs.out.join("rules.json"), &rules.to_json())?;

    if failed > 0 {
        anyhow::bail!("{} of {} sweep variants failed", failed, models.len());
    }
    Ok(())
}

fn run_importance(
    inputs: &Inputs,
    dist: &Path,
    trained: Option<&Path>,
    eliminated: Option<&Path>,
    guests: Option<&Path>,
) -> anyhow::Result<()> {
    let settings = ForgeSettings::from_env()?;
    let rows = load_rows(inputs, &settings)?;
    let model = load_model(dist, settings.tolerance)?;
    let rules = load_rules(&inputs.rules)?;

    let theoretical = theoretical_importance(&rules, &model, &rows)?;
    create_dir(&inputs.out)?;
    io::write_importance(&inputs.out.join("theoretical_importance.csv"), &theoretical)?;

    let eliminated: EliminatedVariables = match eliminated {
        Some(path) => serde_json::from_value(io::read_json(path)?)
            .with_context(|| format!("Invalid eliminated variables in {}", path.display()))?,
        None => EliminatedVariables::default(),
    };

    let mut combined = match trained {
        Some(path) => {
            let report = TrainedImportance {
                importance: io::read_importance(path)?,
                eliminated: eliminated.clone(),
                ..Default::default()
            };
            reconcile(&report, &theoretical)?
        }
        None => normalize_columns(&theoretical),
    };

    if let Some(path) = guests {
        let guests = io::read_guests(path)?;
        let correlation = point_biserial(&guests)?.filter(|feature| !eliminated.contains(feature));
        combined = normalize_columns(&inner_join(&combined, &normalize_columns(&correlation))?);
    }

    io::write_importance(&inputs.out.join("importance.csv"), &combined)?;
    tracing::info!(features = combined.len(), "Importance table written");
    Ok(())
}
