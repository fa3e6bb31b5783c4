use anyhow::Context;
use clap::Parser;
use project_provisioner::config::cli::read_request;
use project_provisioner::utils::{logger, validation::Validate};
use project_provisioner::{AppConfig, Cli, Command, FailureStage, ProvisioningFailure, ProvisioningService};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting project-provisioner");

    let config = match AppConfig::from_file(&cli.config).and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e);
            std::process::exit(2);
        }
    };

    if matches!(cli.command, Command::ValidateConfig) {
        println!("✅ Configuration {} is valid", cli.config.display());
        return Ok(());
    }

    let store = Arc::new(cli.open_store().context("could not open project store")?);
    let service = ProvisioningService::from_config(&config, Arc::new(cli.identity()), store)
        .context("could not build provisioning service")?;

    if let Some(count) = service.refresh_jobs().await {
        tracing::info!("📚 Loaded {} job(s) from the job catalog", count);
    }

    let outcome = match &cli.command {
        Command::Create { request } => {
            let request = read_request(request).context("could not read project request")?;
            service.create_project(request).await
        }
        Command::Update { request } => {
            let request = read_request(request).context("could not read project request")?;
            service.update_project(request).await
        }
        Command::Cleanup { key, stage, components } => {
            let report = service.cleanup(key, *stage, components).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                std::process::exit(3);
            }
            return Ok(());
        }
        Command::ValidateConfig => return Ok(()),
    };

    match outcome {
        Ok(result) => {
            tracing::info!("✅ Provisioning completed");
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(failure) => {
            report_failure(&failure)?;
            // 依失敗階段決定退出碼
            let exit_code = match failure.stage {
                FailureStage::Validation => 2,
                FailureStage::Creation => 1,
                FailureStage::Rollback => 3,
            };
            std::process::exit(exit_code);
        }
    }
}

fn report_failure(failure: &ProvisioningFailure) -> anyhow::Result<()> {
    tracing::error!("❌ Provisioning failed: {}", failure);
    if failure.stage == FailureStage::Rollback {
        tracing::error!("💡 Some artifacts could not be removed, clean them up manually");
    }
    println!("{}", serde_json::to_string_pretty(failure)?);
    Ok(())
}
