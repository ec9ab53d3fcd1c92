//! The watchdog service: aggregated health over the local services and a
//! pluggable restart hook.
//!
//! Every check interval the watchdog GETs `/health` on each configured
//! service. A service that fails (non-2xx or unreachable) for
//! `failure_threshold` consecutive checks is marked CRITICAL and the
//! restart hook fires; the counter then resets so the restarted service
//! gets a full grace window before the hook can fire again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{web, App, HttpResponse, HttpServer};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

use vss_edge_core::EdgeConfig;

/// Consecutive failed checks before a service is CRITICAL.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Seconds between check rounds.
const CHECK_INTERVAL_SECS: u64 = 10;

/// Per-probe timeout.
const PROBE_TIMEOUT_SECS: u64 = 5;

/// Restart integration point; process-manager specific.
pub trait RestartHook: Send + Sync {
    fn restart(&self, service: &str);
}

/// Default hook: substitute the service name into a shell command template
/// (e.g. `systemctl restart vss-{service}`).
pub struct CommandRestartHook {
    pub command_template: String,
}

impl RestartHook for CommandRestartHook {
    fn restart(&self, service: &str) {
        let command = self.command_template.replace("{service}", service);
        warn!(%service, %command, "invoking restart hook");
        match std::process::Command::new("sh").arg("-c").arg(&command).status() {
            Ok(status) if status.success() => info!(%service, "restart hook succeeded"),
            Ok(status) => error!(%service, ?status, "restart hook exited non-zero"),
            Err(e) => error!(%service, "restart hook failed to run: {e}"),
        }
    }
}

/// Hook that only logs; used when no process manager is wired up.
pub struct LogOnlyRestartHook;

impl RestartHook for LogOnlyRestartHook {
    fn restart(&self, service: &str) {
        warn!(%service, "service CRITICAL; no restart hook configured");
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum HealthState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "CRITICAL")]
    Critical,
}

/// Last observed health of one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub url: String,
    pub status: HealthState,
    pub consecutive_failures: u32,
    pub response_time_ms: Option<u64>,
    pub last_error: Option<String>,
}

pub struct Watchdog {
    targets: Vec<(String, String)>,
    failure_threshold: u32,
    hook: Box<dyn RestartHook>,
    client: reqwest::Client,
    statuses: RwLock<HashMap<String, ServiceHealth>>,
}

impl Watchdog {
    /// Build a watchdog over the configured local services.
    pub fn new(config: &EdgeConfig, hook: Box<dyn RestartHook>) -> Self {
        let targets = config
            .services
            .watched()
            .into_iter()
            .map(|(name, port)| (name.to_string(), format!("http://localhost:{port}/health")))
            .collect();
        Self::with_targets(targets, hook)
    }

    /// Build a watchdog over explicit `(name, health url)` targets.
    pub fn with_targets(targets: Vec<(String, String)>, hook: Box<dyn RestartHook>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            targets,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            hook,
            client,
            statuses: RwLock::new(HashMap::new()),
        }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// One check round over every target, firing the restart hook on
    /// services that cross the failure threshold.
    pub async fn check_all(&self) {
        for (name, url) in &self.targets {
            let started = Instant::now();
            let outcome = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => Ok(started.elapsed()),
                Ok(response) => Err(format!("health returned {}", response.status())),
                Err(e) => Err(e.to_string()),
            };

            let mut statuses = self.statuses.write().await;
            let entry = statuses.entry(name.clone()).or_insert_with(|| ServiceHealth {
                name: name.clone(),
                url: url.clone(),
                status: HealthState::Ok,
                consecutive_failures: 0,
                response_time_ms: None,
                last_error: None,
            });

            match outcome {
                Ok(elapsed) => {
                    entry.status = HealthState::Ok;
                    entry.consecutive_failures = 0;
                    entry.response_time_ms = Some(elapsed.as_millis() as u64);
                    entry.last_error = None;
                }
                Err(message) => {
                    entry.consecutive_failures += 1;
                    entry.response_time_ms = None;
                    entry.last_error = Some(message.clone());
                    warn!(
                        service = %name,
                        failures = entry.consecutive_failures,
                        "health check failed: {message}"
                    );

                    if entry.consecutive_failures >= self.failure_threshold {
                        entry.status = HealthState::Critical;
                        error!(service = %name, "service CRITICAL, triggering restart");
                        self.hook.restart(name);
                        // Full grace window before the hook can fire again.
                        entry.consecutive_failures = 0;
                    }
                }
            }
        }
    }

    /// Aggregated view for the watchdog's own `/health` endpoint.
    pub async fn aggregate(&self) -> (HealthState, Vec<ServiceHealth>) {
        let statuses = self.statuses.read().await;
        let mut services: Vec<ServiceHealth> = statuses.values().cloned().collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        let overall = if services.iter().any(|s| s.status == HealthState::Critical) {
            HealthState::Critical
        } else {
            HealthState::Ok
        };
        (overall, services)
    }

    /// Check loop until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(CHECK_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_all().await,
                _ = shutdown.changed() => {
                    info!("watchdog loop stopping");
                    return;
                }
            }
        }
    }
}

async fn health(watchdog: web::Data<Arc<Watchdog>>) -> HttpResponse {
    let (overall, services) = watchdog.aggregate().await;
    let by_name: HashMap<_, _> = services
        .into_iter()
        .map(|service| (service.name.clone(), service))
        .collect();
    HttpResponse::Ok().json(json!({
        "status": overall,
        "services": by_name
    }))
}

/// Serve the aggregated `/health` endpoint.
pub async fn run_server(watchdog: Arc<Watchdog>, port: u16) -> std::io::Result<()> {
    let data = web::Data::new(watchdog);
    info!(port, "watchdog service listening");
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(web::resource("/health").route(web::get().to(health)))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
