#![allow(dead_code)]

use dcc::{KnownInstallations, ProcessRunner};
use renderq_lib::{
    models::{event::QueueEvent, settings::Settings},
    services::{event_sink::ChannelSink, job_queue::JobQueue, session::SessionUpdate},
};
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub const PATIENCE: Duration = Duration::from_secs(20);

/// Executable shell script standing in for a render tool.
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.auto_save = false;
    settings
}

pub fn queue() -> (JobQueue, UnboundedReceiver<QueueEvent>) {
    let (sink, events) = ChannelSink::new();
    let queue = JobQueue::new(
        settings(),
        Arc::new(KnownInstallations::default()),
        Arc::new(sink),
        ProcessRunner::new(),
    );
    (queue, events)
}

/// Apply updates until one matches, returning it.
pub async fn pump_until(
    queue: &mut JobQueue,
    mut wanted: impl FnMut(&SessionUpdate) -> bool,
) -> SessionUpdate {
    tokio::time::timeout(PATIENCE, async {
        loop {
            let update = queue.next_update().await.expect("session channel closed");
            let matched = wanted(&update);
            queue.apply(update.clone()).await;
            if matched {
                return update;
            }
        }
    })
    .await
    .expect("timed out waiting for a session update")
}

pub async fn run_to_end(queue: &mut JobQueue) {
    tokio::time::timeout(PATIENCE, queue.run_until_idle())
        .await
        .expect("queue did not finish");
}

pub async fn wait_for_file(path: &Path) {
    tokio::time::timeout(PATIENCE, async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("file never appeared");
}

pub fn drain(events: &mut UnboundedReceiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut all = Vec::new();
    while let Ok(event) = events.try_recv() {
        all.push(event);
    }
    all
}

pub fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}
