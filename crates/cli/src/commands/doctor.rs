use libdesk_core::config::{AppConfig, LlmProvider, LoadOptions};
use libdesk_db::{connect_from_config, migrations, ping};
use serde::Serialize;

use crate::commands::{CommandResult, EXIT_DOCTOR};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
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

pub fn run(json_output: bool) -> CommandResult {
    let report = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => build_report(Ok(&config)),
        Err(error) => build_report(Err(error.to_string())),
    };
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_DOCTOR };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(config: Result<&AppConfig, String>) -> DoctorReport {
    let mut checks = Vec::new();

    match config {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_llm_settings(config));
            checks.push(check_database(config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error,
            });
            for name in ["llm_settings", "database_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Static check only; the model endpoint is not contacted.
fn check_llm_settings(config: &AppConfig) -> DoctorCheck {
    let endpoint = config.llm.endpoint_base();
    let scheme_ok = endpoint.starts_with("http://") || endpoint.starts_with("https://");
    let key_ok = config.llm.provider != LlmProvider::OpenAi || config.llm.api_key.is_some();

    let status = if scheme_ok && key_ok { CheckStatus::Pass } else { CheckStatus::Fail };
    let details = match (scheme_ok, key_ok) {
        (true, true) => format!(
            "{} model `{}` at {endpoint}",
            config.llm.provider.as_str(),
            config.llm.model
        ),
        (false, _) => format!("llm endpoint `{endpoint}` must be an http(s) URL"),
        (true, false) => "openai provider requires an api key".to_string(),
    };

    DoctorCheck { name: "llm_settings", status, details }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_readiness",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let probe = ping(&pool).await.map_err(|error| format!("database query failed: {error}"));
        let pending = match probe {
            Ok(()) => migrations::pending_count(&pool)
                .await
                .map_err(|error| format!("migration status query failed: {error}")),
            Err(error) => Err(error),
        };

        pool.close().await;
        pending
    });

    match result {
        Ok(0) => DoctorCheck {
            name: "database_readiness",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`, schema up to date", config.database.url),
        },
        Ok(pending) => DoctorCheck {
            name: "database_readiness",
            status: CheckStatus::Fail,
            details: format!("{pending} migration(s) pending; run `libdesk migrate`"),
        },
        Err(error) => {
            DoctorCheck { name: "database_readiness", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use libdesk_core::config::{AppConfig, LlmProvider};

    use super::{build_report, check_llm_settings, render_human, CheckStatus};

    #[test]
    fn config_failure_skips_dependent_checks() {
        let report = build_report(Err("database.url must be a sqlite URL".to_string()));

        assert_eq!(report.overall_status, CheckStatus::Fail);
        let statuses: Vec<CheckStatus> = report.checks.iter().map(|check| check.status).collect();
        assert_eq!(statuses, vec![CheckStatus::Fail, CheckStatus::Skipped, CheckStatus::Skipped]);
        assert!(render_human(&report).contains("- [skip] llm_settings"));
    }

    #[test]
    fn llm_check_reports_provider_and_endpoint() {
        let config = AppConfig::default();
        let check = check_llm_settings(&config);
        assert_eq!(check.status, CheckStatus::Pass);
        assert_eq!(check.details, "ollama model `llama3.1` at http://localhost:11434");

        let mut openai = AppConfig::default();
        openai.llm.provider = LlmProvider::OpenAi;
        openai.llm.api_key = None;
        assert_eq!(check_llm_settings(&openai).status, CheckStatus::Fail);
    }
}
