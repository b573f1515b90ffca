//! rkd CLI
//!
//! # Usage
//!
//! ```bash
//! # Train from config
//! rkd train rkd.yaml
//!
//! # Train with overrides
//! rkd train rkd.yaml --epochs 10 --lr 0.0001
//!
//! # Validate config
//! rkd validate rkd.yaml
//!
//! # Show config info
//! rkd info rkd.yaml --format json
//! ```

use clap::Parser;
use rkd::config::{
    apply_overrides, load_config, run_training, Cli, Command, InfoArgs, OutputFormat, TrainArgs,
    ValidateArgs,
};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Train(args) => run_train(args),
        Command::Validate(args) => run_validate(args),
        Command::Info(args) => run_info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_train(args: TrainArgs) -> Result<(), String> {
    info!(config = %args.config.display(), "loading configuration");
    let mut spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    apply_overrides(&mut spec, &args);
    // Overrides can break ranges the file passed
    rkd::config::validate_numbers(&spec).map_err(|e| format!("Config error: {e}"))?;

    if args.dry_run {
        info!(
            optimizer = %spec.optimizer.name,
            lr = spec.optimizer.lr,
            epochs = spec.training.epochs,
            batch_size = spec.data.batch_size,
            "dry run, configuration is valid"
        );
        return Ok(());
    }

    let report = run_training(spec).map_err(|e| format!("Training error: {e}"))?;
    info!(
        epochs = report.epochs,
        steps = report.steps,
        best_recall = ?report.best_recall,
        checkpoint = %report.checkpoint.display(),
        "training complete"
    );
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    let spec = load_config(&args.config).map_err(|e| format!("Validation failed: {e}"))?;
    println!("Configuration is valid: {}", args.config.display());

    if args.detailed {
        println!();
        println!("  Mode: {}", spec.mode);
        println!("  Dataset: {} ({} classes)", spec.data.dataset, spec.data.dataset.num_classes());
        println!("  Training data: {}", spec.data.train.display());
        if let Some(val) = &spec.data.val {
            println!("  Validation data: {}", val.display());
        }
        println!("  Batch size: {}", spec.data.batch_size);
        println!();
        println!("  Student backbone: {:?}", spec.model.backbone);
        println!("  Embedding size: {}", spec.model.embedding_size);
        if let Some(teacher) = &spec.model.teacher {
            println!("  Teacher checkpoint: {} (prefix {:?})", teacher.checkpoint.display(), teacher.prefix);
        }
        println!();
        println!("  Optimizer: {} (lr={}, weight_decay={})", spec.optimizer.name, spec.optimizer.lr, spec.optimizer.weight_decay);
        println!("  LR milestones: {:?} x{}", spec.training.lr_decay_epochs, spec.training.lr_decay_gamma);
        println!("  Epochs: {}", spec.training.epochs);
        println!("  Output dir: {}", spec.training.output_dir.display());
    }
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<(), String> {
    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    match args.format {
        OutputFormat::Text => {
            let loss = &spec.loss;
            println!("Dataset: {}", spec.data.dataset);
            println!("Optimizer: {} (lr={})", spec.optimizer.name, spec.optimizer.lr);
            println!("Epochs: {}", spec.training.epochs);
            println!("Batch size: {}", spec.data.batch_size);
            println!(
                "Loss: metric={} ({}), triplet={} ({}), dist={}, angle={}, dark={}",
                loss.metric_ratio,
                loss.sample,
                loss.triplet_ratio,
                loss.triplet_sample,
                loss.dist_ratio,
                loss.angle_ratio,
                loss.dark_ratio
            );
            println!("Teacher: {}", if spec.model.teacher.is_some() { "yes" } else { "no" });
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&spec)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&spec)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}
