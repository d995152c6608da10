use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

const PORT_ENV: &str = "GEOFULL_METRICS_PORT";
const DEFAULT_PORT: u16 = 9898;

/// Install the Prometheus exporter for the process. Counter names are
/// prefixed `geofull_`; the scrape endpoint is `/metrics` on the
/// configured port.
pub fn init_metrics() {
    let port: u16 = std::env::var(PORT_ENV)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            println!(
                "[metrics] Prometheus exporter listening on http://{}/metrics",
                addr
            );
        }
        Err(e) => {
            println!(
                "[metrics] Prometheus exporter install failed (possibly already installed): {}",
                e
            );
        }
    }
}
