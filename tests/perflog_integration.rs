//! Integration tests for perflog output written by the runner

use perfcheck::checks::{CheckInstance, JudgePolicy, RunOutput};
use perfcheck::config::PerfLogConfig;
use perfcheck::{CheckRegistry, PerfLogSink, Runner};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tracing_test::traced_test;

fn collective_instance(registry: &CheckRegistry, benchmark: &str, nodes: &str) -> CheckInstance {
    let spec = registry.get("OsuCollectiveCheck").unwrap();
    let pairs = [
        ("benchmark".to_string(), format!("mpi.collective.{benchmark}")),
        ("num_nodes".to_string(), nodes.to_string()),
    ];
    CheckInstance::from_pairs(spec, "cyclone:cpu", "PrgEnv-gnu-nocuda", &pairs).unwrap()
}

fn osu_output() -> RunOutput {
    RunOutput::new(
        "# OSU MPI Allreduce Latency Test v5.9\n\
         # Size       Avg Latency(us)\n\
         4                       2.61\n\
         8                       2.80\n\
         16                      2.95\n",
    )
    .with_job_id("918273")
    .with_completion_time(Utc.with_ymd_and_hms(2023, 5, 4, 12, 30, 0).unwrap())
}

fn sink(dir: &TempDir, append: bool) -> PerfLogSink {
    PerfLogSink::new(&PerfLogConfig {
        enabled: true,
        directory: dir.path().to_path_buf(),
        append,
    })
}

#[tokio::test]
#[traced_test]
async fn test_runner_writes_perflog_lines() {
    let dir = TempDir::new().unwrap();
    let registry = CheckRegistry::builtin().unwrap();
    let runner = Runner::new(JudgePolicy::default(), 2, Some(sink(&dir, true)));

    let instance = collective_instance(&registry, "osu_allreduce", "3");
    runner.run(&instance, &osu_output()).await.unwrap();
    runner.run(&instance, &osu_output()).await.unwrap();

    let path = dir
        .path()
        .join("cyclone")
        .join("cpu")
        .join("OsuCollectiveCheck.log");
    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let fields: Vec<&str> = lines[0].split('|').collect();
    assert_eq!(fields[0], "2023-05-04T12:30:00+00:00");
    assert!(fields[1].starts_with("perfcheck "));
    assert_eq!(fields[2], instance.check_info());
    assert_eq!(fields[3], "jobid=918273");
    assert_eq!(fields[4], "latency=2.8");
    assert_eq!(fields[5], "ref=2.79 (l=None, u=0.1)");
    assert_eq!(fields[6], "us");
}

#[tokio::test]
#[traced_test]
async fn test_failed_verdict_is_logged() {
    let dir = TempDir::new().unwrap();
    let registry = CheckRegistry::builtin().unwrap();
    let runner = Runner::new(JudgePolicy::default(), 2, Some(sink(&dir, true)));

    // 2.8 us against 1.93 us on six nodes
    let report = runner
        .run(&collective_instance(&registry, "osu_alltoall", "6"), &osu_output())
        .await
        .unwrap();
    assert!(!report.status.is_success());

    let path = dir
        .path()
        .join("cyclone")
        .join("cpu")
        .join("OsuCollectiveCheck.log");
    let content = std::fs::read_to_string(path).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("|latency=2.8|ref=1.93 (l=None, u=0.1)|us"));
}

#[tokio::test]
async fn test_batch_without_append_keeps_every_instance() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("cyclone").join("cpu")).unwrap();
    std::fs::write(
        dir.path().join("cyclone").join("cpu").join("OsuCollectiveCheck.log"),
        "stale line from an earlier session\n",
    )
    .unwrap();

    let registry = CheckRegistry::builtin().unwrap();
    let runner = Runner::new(JudgePolicy::default(), 4, Some(sink(&dir, false)));
    let jobs = vec![
        (collective_instance(&registry, "osu_allreduce", "3"), osu_output()),
        (collective_instance(&registry, "osu_alltoall", "6"), osu_output()),
    ];
    let results = runner.judge_batch(jobs).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let content = std::fs::read_to_string(
        dir.path().join("cyclone").join("cpu").join("OsuCollectiveCheck.log"),
    )
    .unwrap();
    assert!(!content.contains("stale"));
    assert_eq!(content.lines().count(), 2);
}
