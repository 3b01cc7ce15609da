//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    /// Live viewers currently registered.
    pub connections: usize,
}

pub fn health_check(start_time: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_server_is_ok_with_no_uptime() {
        let resp = health_check(Instant::now(), 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn reports_uptime_and_viewers() {
        let start = Instant::now().checked_sub(Duration::from_secs(90)).unwrap();
        let resp = health_check(start, 4);
        assert!(resp.uptime_secs >= 89);
        assert_eq!(resp.connections, 4);
    }

    #[test]
    fn serializes_flat() {
        let json = serde_json::to_value(health_check(Instant::now(), 2)).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 2);
        assert!(json["uptime_secs"].is_u64());
    }
}
