use serde::Serialize;
use storefront_core::config::{AppConfig, LoadOptions};
use storefront_db::{connect_from_config, migrations};

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

/// Exit code is 0 unless a check fails; warnings (such as no login provider) still pass.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    if json_output {
        return CommandResult::json("doctor", exit_code, &report);
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_login_providers(&config));
            checks.push(check_static_assets(&config));
            checks.push(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["login_providers", "static_assets", "database_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_fail =
        checks.iter().any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let any_warn = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = if any_fail {
        (CheckStatus::Fail, "doctor: one or more readiness checks failed")
    } else if any_warn {
        (CheckStatus::Warn, "doctor: readiness checks passed with warnings")
    } else {
        (CheckStatus::Pass, "doctor: all readiness checks passed")
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_login_providers(config: &AppConfig) -> DoctorCheck {
    let enabled: Vec<&str> = [("Google", &config.auth.google), ("Facebook", &config.auth.facebook)]
        .into_iter()
        .filter(|(_, credentials)| credentials.is_enabled())
        .map(|(name, _)| name)
        .collect();

    if enabled.is_empty() {
        DoctorCheck {
            name: "login_providers",
            status: CheckStatus::Warn,
            details: "no external login provider configured; sign-in will be unavailable"
                .to_string(),
        }
    } else {
        DoctorCheck {
            name: "login_providers",
            status: CheckStatus::Pass,
            details: format!("enabled: {}", enabled.join(", ")),
        }
    }
}

fn check_static_assets(config: &AppConfig) -> DoctorCheck {
    let images = config.server.static_dir.join("images");
    if images.is_dir() {
        DoctorCheck {
            name: "static_assets",
            status: CheckStatus::Pass,
            details: format!("serving product images from `{}`", images.display()),
        }
    } else {
        DoctorCheck {
            name: "static_assets",
            status: CheckStatus::Warn,
            details: format!("`{}` is missing; product images will 404", images.display()),
        }
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        let pending = migrations::pending_count(&pool)
            .await
            .map_err(|error| format!("failed to read migration history: {error}"));
        pool.close().await;
        pending
    });

    match result {
        Ok(0) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`; schema is current", config.database.url),
        },
        Ok(pending) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Warn,
            details: format!(
                "connected using `{}`; {pending} migration(s) pending, run `storefront migrate`",
                config.database.url
            ),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
