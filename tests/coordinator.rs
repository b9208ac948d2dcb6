mod common;

use anyhow::Result;
use std::io::Read;
use std::time::Duration;
use supportbundle::{BundleError, BundleState, Coordinator, MemoryStatusStore};

use common::{BUNDLE_NAME, FakeCluster};

#[tokio::test]
async fn test_all_nodes_report_and_archive_is_served() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let store = common::store();
    let request = common::request(dir.path(), 3, Duration::from_secs(30));
    let (addr_rx, run) =
        common::spawn_coordinator(request, common::collaborators(FakeCluster::default(), &store));

    let addr = addr_rx.await?;
    assert_eq!(store.history(), vec![BundleState::ManagerDone]);

    let client = reqwest::Client::new();
    let uploads = ["a", "b", "c"].map(|node| {
        let client = client.clone();
        tokio::spawn(async move { common::upload(&client, addr, node, common::node_bundle(node)).await })
    });
    for upload in uploads {
        assert_eq!(upload.await??.status(), reqwest::StatusCode::CREATED);
    }

    let mut report = run.await??;
    assert_eq!(report.state, BundleState::AgentDone);
    assert!(report.is_success());
    assert_eq!(report.collection_errors, 0);
    let archive = report.archive.clone().expect("archive");
    assert!(archive.name.starts_with("supportbundle_0e3b6e8c-uid_"));
    assert!(archive.name.ends_with(".zip"));

    let record = store.record(BUNDLE_NAME).unwrap();
    assert_eq!(record.state, BundleState::AgentDone);
    assert_eq!(record.filename, archive.name);
    assert_eq!(record.filesize, archive.size);
    assert_eq!(
        store.history(),
        vec![BundleState::ManagerDone, BundleState::AgentDone]
    );

    let response = common::download(&client, addr).await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        format!("attachment; filename={}", archive.name).as_str()
    );
    let body = response.bytes().await?;
    assert_eq!(body.len() as u64, archive.size);

    let entries = common::archive_entries(&body)?;
    for expected in [
        "bundle/",
        "bundle/metadata.yaml",
        "bundle/bundleGenerationError.log",
        "bundle/yamls/kubernetes/pods.yaml",
        "bundle/yamls/kubernetes/nodes.yaml",
        "bundle/logs/harvester-system/harvester-system-pod/main.log",
        "bundle/external/",
        "bundle/nodes/a.zip",
        "bundle/nodes/b.zip",
        "bundle/nodes/c.zip",
    ] {
        assert!(
            entries.iter().any(|e| e == expected),
            "missing {} in {:?}",
            expected,
            entries
        );
    }

    report.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_node_times_out_with_error() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let store = common::store();
    let request = common::request(dir.path(), 2, Duration::from_millis(500));
    let (addr_rx, run) =
        common::spawn_coordinator(request, common::collaborators(FakeCluster::default(), &store));

    let addr = addr_rx.await?;
    let client = reqwest::Client::new();
    let response = common::upload(&client, addr, "a", common::node_bundle("a")).await?;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let mut report = run.await??;
    assert_eq!(report.state, BundleState::Error);
    assert!(report.archive.is_none());
    let detail = report.detail.clone().unwrap();
    assert!(detail.contains("not all nodes reported"), "{}", detail);
    assert!(detail.contains("1/2"), "{}", detail);

    let record = store.record(BUNDLE_NAME).unwrap();
    assert_eq!(record.state, BundleState::Error);
    assert_eq!(record.error, detail);
    assert!(record.filename.is_empty());

    // The listener keeps running, but there is nothing to download
    let response = common::download(&client, addr).await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let zips: Vec<_> = std::fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "zip"))
        .collect();
    assert!(zips.is_empty());

    report.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_late_upload_is_accepted_but_ignored() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let store = common::store();
    let request = common::request(dir.path(), 1, Duration::from_millis(200));
    let (addr_rx, run) =
        common::spawn_coordinator(request, common::collaborators(FakeCluster::default(), &store));

    let addr = addr_rx.await?;
    let mut report = run.await??;
    assert_eq!(report.state, BundleState::Error);

    let client = reqwest::Client::new();
    let response = common::upload(&client, addr, "a", common::node_bundle("a")).await?;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    assert!(dir.path().join("bundle/nodes/a.zip").is_file());

    let status: serde_json::Value = client
        .get(format!("http://{}/bundle/status", addr))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["bundle"]["reported"], 0);
    assert_eq!(status["bundle"]["expired"], true);
    assert_eq!(store.record(BUNDLE_NAME).unwrap().state, BundleState::Error);

    report.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_reupload_counts_once() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let store = common::store();
    let request = common::request(dir.path(), 2, Duration::from_secs(30));
    let (addr_rx, run) =
        common::spawn_coordinator(request, common::collaborators(FakeCluster::default(), &store));

    let addr = addr_rx.await?;
    let client = reqwest::Client::new();
    for _ in 0..2 {
        let response = common::upload(&client, addr, "a", common::node_bundle("a")).await?;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    }

    let status: serde_json::Value = client
        .get(format!("http://{}/bundle/status", addr))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status["bundle"]["reported"], 1);
    assert_eq!(status["bundle"]["released"], false);
    assert!(!run.is_finished());

    let response = common::upload(&client, addr, "b", common::node_bundle("b")).await?;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let mut report = run.await??;
    assert_eq!(report.state, BundleState::AgentDone);
    report.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_collection_error_does_not_stop_run() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let store = common::store();
    let request = common::request(dir.path(), 1, Duration::from_secs(30));
    let (addr_rx, run) = common::spawn_coordinator(
        request,
        common::collaborators(FakeCluster::failing("nodes"), &store),
    );

    let addr = addr_rx.await?;
    assert_eq!(store.history(), vec![BundleState::ManagerDone]);

    let client = reqwest::Client::new();
    common::upload(&client, addr, "a", common::node_bundle("a")).await?;
    let mut report = run.await??;
    assert_eq!(report.state, BundleState::AgentDone);
    assert_eq!(report.collection_errors, 1);

    let error_log = std::fs::read_to_string(dir.path().join("bundle/bundleGenerationError.log"))?;
    assert!(error_log.starts_with("Support Bundle:"));
    assert!(error_log.contains("nodes is forbidden"));

    let archive = report.archive.clone().unwrap();
    let mut zip = zip::ZipArchive::new(std::fs::File::open(&archive.path)?)?;
    let mut packed = String::new();
    zip.by_name("bundle/bundleGenerationError.log")?
        .read_to_string(&mut packed)?;
    assert_eq!(packed, error_log);

    report.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_generation_failure_is_published() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let store = common::store();
    let cluster = FakeCluster {
        missing_namespace: true,
        ..Default::default()
    };
    let request = common::request(dir.path(), 1, Duration::from_secs(30));
    let (addr_rx, run) = common::spawn_coordinator(request, common::collaborators(cluster, &store));

    let report = run.await??;
    assert_eq!(report.state, BundleState::Error);
    assert!(report.server.is_none());
    assert!(addr_rx.await.is_err());

    let record = store.record(BUNDLE_NAME).unwrap();
    assert!(record.error.contains("fail to generate cluster bundle"));
    assert_eq!(store.history(), vec![BundleState::Error]);
    Ok(())
}

#[tokio::test]
async fn test_wrong_start_state_is_precondition_error() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let store = std::sync::Arc::new(MemoryStatusStore::with_request(
        BUNDLE_NAME,
        BundleState::ManagerDone,
    ));
    let request = common::request(dir.path(), 1, Duration::from_secs(30));

    let err = Coordinator::new(request, common::collaborators(FakeCluster::default(), &store))
        .run()
        .await
        .err()
        .expect("precondition error");
    match err {
        BundleError::Precondition { expected, found } => {
            assert_eq!(expected, "generating");
            assert_eq!(found, "managerdone");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(store.history().is_empty());
    assert!(!dir.path().join("bundle/metadata.yaml").exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_configuration_publishes_nothing() -> Result<()> {
    let dir = common::setup_temp_dir()?;
    let store = common::store();
    let request = common::request(dir.path(), 0, Duration::from_secs(30));

    let err = Coordinator::new(request, common::collaborators(FakeCluster::default(), &store))
        .run()
        .await
        .err()
        .expect("configuration error");
    assert!(matches!(err, BundleError::Configuration(_)));
    assert!(store.history().is_empty());
    assert!(!dir.path().join("bundle").exists());
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_wait_timeout_publishes_nothing() {
    let dir = common::setup_temp_dir().unwrap();
    let store = common::store();
    let request = common::request(dir.path(), 1, Duration::from_secs(u64::MAX));
    let (addr_rx, run) =
        common::spawn_coordinator(request, common::collaborators(FakeCluster::default(), &store));

    let result = run.await.expect("coordinator must not panic");
    assert!(matches!(result, Err(BundleError::Configuration(_))));
    assert!(addr_rx.await.is_err());
    assert!(store.history().is_empty());
    assert_eq!(store.record(BUNDLE_NAME).unwrap().state, BundleState::Generating);
}
