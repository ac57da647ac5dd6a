#![allow(dead_code)]

use dbcluster_core::scripted::ScriptedConnector;
use dbcluster_core::{Cluster, ClusterConfig, ClusterInit, DebugFlag, Endpoint};
use std::io;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

pub const WRITER: &str = "w";

/// Cluster descriptor with writer `w` and the given reader hosts.
pub fn config(readers: &[&str]) -> ClusterConfig {
    ClusterConfig {
        driver: "mysql".to_string(),
        database: "article".to_string(),
        charset: "utf8mb4".to_string(),
        username: "root".to_string(),
        password: "x".to_string(),
        write: Endpoint::new(WRITER, 3306),
        read: readers.iter().map(|host| Endpoint::new(*host, 3306)).collect(),
        pool: Default::default(),
    }
}

/// Open a cluster on a fresh scripted connector.
pub async fn cluster(readers: &[&str], debug: DebugFlag) -> (Arc<Cluster>, Arc<ScriptedConnector>) {
    let connector = Arc::new(ScriptedConnector::new());
    let init = ClusterInit::new(debug);
    let cluster = init
        .init(&config(readers), connector.as_ref())
        .await
        .expect("scripted cluster should open");
    (cluster, connector)
}

/// Collects formatted tracing output for the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Route this thread's events into a new capture until the guard drops.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}
