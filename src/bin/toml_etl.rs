use anyhow::Context;
use clap::Parser;
use ipr_etl::config::toml_config::TomlConfig;
use ipr_etl::core::postcode::PostcodeDirectory;
use ipr_etl::core::{ConfigProvider, Dataset};
use ipr_etl::utils::error::{EtlError, ErrorSeverity};
use ipr_etl::utils::{logger, validation::Validate};
use ipr_etl::{EtlEngine, IprPipeline, LocalStorage};

#[derive(Parser)]
#[command(name = "toml-etl")]
#[command(about = "Run the IPR cleaning pipeline from a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "ipr-etl.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

fn report_failure(stage: &str, e: &EtlError) -> i32 {
    tracing::error!(
        "❌ {}: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 載入 TOML 配置（先於日誌初始化，才能決定日誌格式）
    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if config.json_logs() {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting TOML-based IPR ETL");
    tracing::info!("📁 Configuration loaded from: {}", args.config);

    // 驗證配置
    if let Err(e) = config.validate() {
        report_failure("Configuration validation failed", &e);
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        perform_dry_run(&config)?;
        return Ok(());
    }

    // 決定監控設定
    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = match IprPipeline::new(storage, config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            let code = report_failure("Pipeline setup failed", &e);
            std::process::exit(code.max(1));
        }
    };

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ ETL process completed successfully!");
            println!("✅ ETL process completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            let code = report_failure("ETL process failed", &e);
            if code > 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name,
        config.pipeline.version.as_deref().unwrap_or("0.0.0")
    );
    println!("  Input: {}", config.input_file());
    println!("  Output: {}", config.output_path());
    println!("  Formats: {}", config.load.output_formats.join(", "));
    println!("  Postcode files: {}", config.lookup_files().len());
    println!("  Geocoding: {}", if config.geocoding().is_active() { "on" } else { "off" });

    if let Some(max_records) = config.max_records() {
        println!("  Max Records: {}", max_records);
    }

    println!("  Concurrent Requests: {}", config.concurrent_requests());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &TomlConfig) -> anyhow::Result<()> {
    println!("🔍 Dry Run Analysis:");
    println!();

    let bytes = std::fs::read(config.input_file())
        .with_context(|| format!("reading input file '{}'", config.input_file()))?;
    let dataset = Dataset::from_json_slice(&bytes)?;

    println!("📥 Input:");
    println!("  Records: {}", dataset.len());
    println!("  Columns: {}", dataset.columns.join(", "));
    if let Some(max) = config.max_records() {
        println!("  📊 Max records limit: {}", max);
    }

    if !config.lookup_files().is_empty() {
        println!();
        println!("📮 Postcode lookup:");
        for file in config.lookup_files() {
            let bytes =
                std::fs::read(file).with_context(|| format!("reading postcode file '{}'", file))?;
            let directory = PostcodeDirectory::from_bytes(file, &bytes)?;
            println!("  {}: {} rows ({})", file, directory.len(), directory.columns.join(", "));
        }
    }

    let rules = config.cleaning_rules();
    println!();
    println!("🛠️ Cleaning rules:");
    println!("  Drop columns: {}", rules.drop_columns.join(", "));
    let mut mapping: Vec<_> = rules.column_mapping.iter().collect();
    mapping.sort();
    for (from, to) in mapping {
        println!("  {} -> {}", from, to);
    }
    println!("  Age reference year: {}", rules.reference_year);

    let output = config.output_settings();
    println!();
    println!("💾 Output Configuration:");
    println!("  Path: {}", config.output_path());
    for format in &output.formats {
        println!("  {}.{}", output.base_name, format.extension());
    }
    if let Some(zip) = &output.zip_filename {
        println!("  Compression: {} (ZIP)", zip);
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");

    Ok(())
}
