use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use camels_client::common::config::AppCfg;
use camels_client::common::log;
use camels_client::data::repo_fs::read_csv;
use camels_client::evaluation::SessionOutcome;
use camels_client::training::baseline::{BaselinePredictor, SummaryFeatures};
use camels_client::{Algorithm, Client, Learner, Metric, Task};

#[derive(Debug, Parser)]
#[command(name = "camels", about = "Recommender benchmarking client")]
struct Args {
    /// Registry base URL; overrides settings file and environment.
    #[arg(long, env = "CAMELS_REGISTRY_URL")]
    registry_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync the identifier manifest and print it.
    Sync,
    /// Ask the registry to seed its database.
    Populate,
    /// Train meta-learners on the registry.
    TrainMeta {
        #[arg(long = "metric", required = true)]
        metrics: Vec<String>,
        #[arg(long = "task", required = true)]
        tasks: Vec<String>,
        #[arg(long = "learner", required = true)]
        learners: Vec<String>,
    },
    /// Evaluate baseline algorithms on a ratings CSV.
    Evaluate {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        task: String,
        #[arg(long = "algorithm", required = true)]
        algorithms: Vec<String>,
        #[arg(long = "metric", required = true)]
        metrics: Vec<String>,
        /// Evaluate locally without consulting or updating the registry.
        #[arg(long)]
        no_upload: bool,
    },
    /// Predict the best algorithm for a ratings CSV and train it.
    Predict {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        metric: String,
        #[arg(long)]
        task: String,
        #[arg(long)]
        learner: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = AppCfg::load()?;
    if let Some(url) = args.registry_url {
        cfg.merge_env(|key| (key == "CAMELS_REGISTRY_URL").then(|| url.clone()))?;
    }
    log::init(&cfg);

    let client = Client::connect(cfg)?;
    match args.command {
        Command::Sync => {
            println!("{}", serde_json::to_string_pretty(client.manifest())?);
        }
        Command::Populate => {
            let ack = client.populate_database()?;
            println!("{ack}");
        }
        Command::TrainMeta {
            metrics,
            tasks,
            learners,
        } => {
            let metrics: Vec<Metric> = metrics.iter().map(|m| Metric::new(m.as_str())).collect();
            let tasks: Vec<Task> = tasks.iter().map(|t| Task::new(t.as_str())).collect();
            let learners: Vec<Learner> = learners.iter().map(|l| Learner::new(l.as_str())).collect();
            for table in client.train_meta_learner(&metrics, &tasks, &learners)? {
                println!("{table}");
            }
        }
        Command::Evaluate {
            file,
            task,
            algorithms,
            metrics,
            no_upload,
        } => {
            let data = read_csv(&file)?;
            let algorithms: Vec<Algorithm> = algorithms.into_iter().map(Algorithm::new).collect();
            let metrics: Vec<Metric> = metrics.into_iter().map(Metric::new).collect();
            let outcome = client.evaluate_algorithms(
                &algorithms,
                &metrics,
                &Task::new(task),
                &data,
                &BaselinePredictor,
                &SummaryFeatures,
                !no_upload,
            );
            match outcome {
                SessionOutcome::Completed(report) => {
                    for run in &report.runs {
                        println!("{}\t{}\t{:.6}", run.algorithm, run.metric, run.score);
                    }
                    for failure in &report.failed {
                        eprintln!("{} failed: {}", failure.algorithm, failure.error);
                    }
                    if let Some(err) = report.upload_error {
                        bail!("upload failed: {err}");
                    }
                }
                SessionOutcome::Aborted(err) => bail!("evaluation aborted: {err}"),
            }
        }
        Command::Predict {
            file,
            metric,
            task,
            learner,
        } => {
            let data = read_csv(&file)?;
            let best = client.predict_with_meta_learner(
                &Metric::new(metric),
                &Task::new(task),
                &Learner::new(learner),
                &data,
                &SummaryFeatures,
                &BaselinePredictor,
            )?;
            for forecast in &best.forecasts {
                println!("{}\t{:.6}", forecast.algorithm, forecast.score);
            }
            println!("best: {}", best.algorithm);
        }
    }
    Ok(())
}
