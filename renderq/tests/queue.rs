#![cfg(unix)]

mod common;

use common::*;
use dcc::ApplicationType;
use renderq_lib::models::{
    event::QueueEvent,
    job::{JobStatus, RenderJob},
};
use std::path::PathBuf;

#[tokio::test(flavor = "multi_thread")]
async fn blender_job_renders_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(
        dir.path(),
        "blender",
        &format!(
            "for frame; do :; done\n\
             echo \"Fra:$frame Mem:12M | Sample 1/2\"\n\
             echo \"Fra:$frame Mem:12M | Sample 2/2\"\n\
             echo \"Saved: '{}/out_000$frame.png'\"",
            dir.path().display()
        ),
    );

    let (mut queue, mut events) = queue();
    let id = queue
        .add_job(
            RenderJob::new(dir.path().join("shot.blend"), ApplicationType::Blender)
                .with_frame_ranges("1-3")
                .with_executable(&tool),
        )
        .await;
    assert_eq!(queue.start_rendering().await.unwrap(), Some(id.clone()));
    run_to_end(&mut queue).await;

    let job = queue.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.progress, 100.0);
    assert_eq!(job.frame_times.len(), 3);
    assert_eq!(
        job.rendered_frame_paths,
        (1..=3)
            .map(|f| dir.path().join(format!("out_000{f}.png")))
            .collect::<Vec<PathBuf>>()
    );

    let events = drain(&mut events);
    let rendered: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            QueueEvent::FrameRendered { frame, .. } => Some(*frame),
            _ => None,
        })
        .collect();
    assert_eq!(rendered, [1, 2, 3]);
    assert!(matches!(
        events.iter().rev().find(|e| !matches!(e, QueueEvent::ProcessUpdate { .. } | QueueEvent::RenderOutput { .. })),
        Some(QueueEvent::RenderComplete { .. })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, QueueEvent::RenderOutput { output, .. } if output.contains("Sample 2/2"))));
    // finished process records are dropped from the runner
    assert!(queue.session().runner().list().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn range_tools_render_each_run_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("invocations.log");
    let tool = fake_tool(
        dir.path(),
        "nuke",
        &format!("echo \"$@\" >> '{}'", log.display()),
    );

    let (mut queue, _events) = queue();
    let id = queue
        .add_job(
            RenderJob::new(dir.path().join("comp.nk"), ApplicationType::Nuke)
                .with_frame_ranges("1-3, 10-11")
                .with_executable(&tool),
        )
        .await;
    queue.start_rendering().await.unwrap();
    run_to_end(&mut queue).await;

    let job = queue.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.current_frame, 5);
    let invocations = lines(&log);
    assert_eq!(invocations.len(), 2);
    assert!(invocations[0].contains("-F 1-3 -x"), "{}", invocations[0]);
    assert!(invocations[1].contains("-F 10-11 -x"), "{}", invocations[1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_after_effects_success_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "aerender", "echo 'aerender version 24.0'\nexit 0");

    let (mut queue, mut events) = queue();
    let id = queue
        .add_job(
            RenderJob::new(dir.path().join("promo.aep"), ApplicationType::AfterEffects)
                .with_executable(&tool),
        )
        .await;
    queue.start_rendering().await.unwrap();
    run_to_end(&mut queue).await;

    let job = queue.job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap().contains("rendered nothing"));
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        QueueEvent::RenderError { exit_code: Some(0), .. }
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn a_failed_job_does_not_stop_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let broken = fake_tool(
        dir.path(),
        "broken",
        "echo 'Error: Not enough memory' >&2\nexit 1",
    );
    let working = fake_tool(
        dir.path(),
        "working",
        &format!(
            "for frame; do :; done\necho \"Saved: '{}/ok_$frame.png'\"",
            dir.path().display()
        ),
    );

    let (mut queue, _events) = queue();
    let first = queue
        .add_job(
            RenderJob::new(dir.path().join("a.blend"), ApplicationType::Blender)
                .with_frame_ranges("1-2")
                .with_executable(&broken),
        )
        .await;
    let missing = queue
        .add_job(
            RenderJob::new(dir.path().join("b.blend"), ApplicationType::Blender)
                .with_frame_ranges("1")
                .with_executable(dir.path().join("no-such-blender")),
        )
        .await;
    let last = queue
        .add_job(
            RenderJob::new(dir.path().join("c.blend"), ApplicationType::Blender)
                .with_frame_ranges("4-5")
                .with_executable(&working),
        )
        .await;

    queue.start_rendering().await.unwrap();
    run_to_end(&mut queue).await;

    let failed = queue.job(&first).unwrap();
    assert_eq!(failed.status, JobStatus::Error);
    let message = failed.error.as_deref().unwrap();
    assert!(message.contains("code 1"), "{message}");
    assert!(message.contains("Not enough memory"), "{message}");

    let unstartable = queue.job(&missing).unwrap();
    assert_eq!(unstartable.status, JobStatus::Error);
    assert!(unstartable.error.as_deref().unwrap().contains("Failed to start"));

    assert_eq!(queue.job(&last).unwrap().status, JobStatus::Complete);
    assert!(!queue.is_rendering());
}

#[tokio::test(flavor = "multi_thread")]
async fn jobs_without_an_application_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let working = fake_tool(dir.path(), "maya", "exit 0");

    let (mut queue, _events) = queue();
    let skipped = queue
        .add_job(RenderJob::new(dir.path().join("fx.hip"), ApplicationType::Houdini))
        .await;
    let rendered = queue
        .add_job(
            RenderJob::new(dir.path().join("shot.mb"), ApplicationType::Maya)
                .with_frame_ranges("1-2")
                .with_executable(&working),
        )
        .await;
    assert_eq!(queue.job(&skipped).unwrap().status, JobStatus::MissingApp);

    assert_eq!(queue.start_rendering().await.unwrap(), Some(rendered.clone()));
    run_to_end(&mut queue).await;
    assert_eq!(queue.job(&rendered).unwrap().status, JobStatus::Complete);
    assert_eq!(queue.job(&skipped).unwrap().status, JobStatus::MissingApp);

    let totals = queue.totals();
    assert_eq!(totals.total_frames, 2);
    assert_eq!(totals.rendered_frames, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn starting_twice_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), "nuke", "sleep 30");

    let (mut queue, _events) = queue();
    queue
        .add_job(
            RenderJob::new(dir.path().join("comp.nk"), ApplicationType::Nuke)
                .with_frame_ranges("1-3")
                .with_executable(&tool),
        )
        .await;
    let active = queue.start_rendering().await.unwrap().unwrap();
    assert!(queue.start_rendering().await.is_err());
    assert!(queue.remove_job(&active).await.is_err());

    queue.stop_rendering().await.unwrap();
    assert_eq!(queue.job(&active).unwrap().status, JobStatus::Idle);
    assert!(queue.remove_job(&active).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn scene_info_sets_frames_before_queueing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("render");
    std::fs::create_dir(&out).unwrap();
    std::fs::write(out.join("shot_0011.png"), b"").unwrap();
    let tool = fake_tool(
        dir.path(),
        "blender",
        &format!(
            "echo 'BLEND_INFO_JSON:{{\"frameStart\": 10, \"frameEnd\": 14, \"fps\": 24, \
             \"outputPath\": \"{out}/shot_####\", \"outputDir\": \"{out}\", \
             \"outputPattern\": \"shot_####\", \"renderEngine\": \"CYCLES\", \
             \"resolution\": {{\"x\": 960, \"y\": 540, \"percentage\": 100}}, \
             \"format\": \"PNG\", \"isVideoOutput\": false}}'",
            out = out.display()
        ),
    );

    let (mut queue, _events) = queue();
    let mut job = RenderJob::new(dir.path().join("shot.blend"), ApplicationType::Blender)
        .with_executable(&tool);
    let info = queue.scene_info(&job).await.unwrap();
    assert!(!info.is_defaults);
    job.apply_scene_info(&info);
    let id = queue.add_job(job).await;

    let job = queue.job(&id).unwrap();
    assert_eq!(job.total_frames, 5);
    assert_eq!(job.effective_range(), "10-14");
    let existing = queue.existing_frames(&id).unwrap();
    assert_eq!(existing.len(), 1);
    assert_eq!(existing[0].frame, 11);
    // the probe does not linger in the runner
    assert!(queue.session().runner().list().is_empty());

    // nothing to ask for tools without a scene reader
    let nuke = RenderJob::new(dir.path().join("comp.nk"), ApplicationType::Nuke);
    assert!(queue.scene_info(&nuke).await.unwrap().is_defaults);
}
