use std::time::Duration;

use anyhow::{Context, Result};
use swarmd_test_support::fixtures::{MetainfoBuilder, magnet_uri};
use swarmd_torrent_core::{FilePriority, TorrentSource, TorrentStateCode};
use swarmd_torrent_libt::alert::{StatePayload, kinds};
use swarmd_torrent_libt::{
    AddParams, AlertReceiver, NativeAlert, NativeSessionAdapter, SimulatedSession,
    SimulationConfig, SwarmDirectory,
};
use tokio::time::timeout;

async fn next_state(alerts: &mut AlertReceiver, wanted: TorrentStateCode) -> Result<Vec<NativeAlert>> {
    let mut seen = Vec::new();
    timeout(Duration::from_secs(10), async {
        while let Some(alert) = alerts.recv().await {
            let reached = alert.kind == kinds::STATE_CHANGED
                && alert
                    .decode::<StatePayload>()
                    .is_ok_and(|payload| payload.state == wanted);
            seen.push(alert);
            if reached {
                return Ok(());
            }
        }
        anyhow::bail!("alert stream closed before {wanted:?}")
    })
    .await
    .context("timed out waiting for state")??;
    Ok(seen)
}

#[tokio::test]
async fn magnet_resolves_once_published_and_skipped_files_stay_empty() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fixture = MetainfoBuilder::new("pack")
        .piece_length(8)
        .file("keep.bin", 32)
        .file("skip.bin", 32)
        .tracker("https://tracker.test/announce")
        .build();
    let swarm = SwarmDirectory::new();
    let config = SimulationConfig {
        seed_after_finish: false,
        ..SimulationConfig::fast()
    };
    let adapter = NativeSessionAdapter::new(SimulatedSession::new(config, swarm.clone()));
    let mut alerts = adapter.start()?;

    let uri = magnet_uri(&fixture.info_hash_hex, Some("pack"), &["https://tracker.test/announce"]);
    let info = adapter.inspect_source(&TorrentSource::magnet(uri))?;
    let id = info.id.clone();
    adapter
        .add(AddParams {
            id: id.clone(),
            info,
            save_path: dir.path().to_path_buf(),
            priorities: vec![FilePriority::High, FilePriority::Skip],
            paused: false,
        })
        .await?;
    next_state(&mut alerts, TorrentStateCode::DownloadingMetadata).await?;

    swarm.publish_metainfo(&fixture.bytes)?;
    let seen = next_state(&mut alerts, TorrentStateCode::Finished).await?;
    assert!(seen.iter().any(|alert| alert.kind == kinds::METADATA_RECEIVED));
    assert!(seen.iter().any(|alert| alert.kind == kinds::TORRENT_FINISHED));

    let pieces = adapter.query_pieces(&id).await?;
    assert_eq!(pieces.len(), 8);
    assert!(pieces[..4].iter().all(|bit| *bit));
    assert!(pieces[4..].iter().all(|bit| !*bit));

    adapter
        .set_priorities(&id, &[FilePriority::Normal, FilePriority::Normal])
        .await?;
    next_state(&mut alerts, TorrentStateCode::Finished).await?;
    assert!(adapter.query_pieces(&id).await?.iter().all(|bit| *bit));

    let outcome = adapter.remove(&id, true).await?.context("handle present")?;
    assert!(outcome.data_error.is_none());
    assert!(!dir.path().join("pack").exists());
    adapter.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unsupported_tracker_reports_error_but_download_proceeds() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fixture = MetainfoBuilder::new("mixed.bin")
        .file("mixed.bin", 48)
        .tracker("wss://tracker.test/announce")
        .tracker("udp://tracker.test:6969/announce")
        .build();
    let adapter = NativeSessionAdapter::new(SimulatedSession::new(
        SimulationConfig::fast(),
        SwarmDirectory::new(),
    ));
    let mut alerts = adapter.start()?;
    let info = adapter.inspect_source(&TorrentSource::metainfo(fixture.bytes.clone()))?;
    adapter
        .add(AddParams {
            id: info.id.clone(),
            info,
            save_path: dir.path().to_path_buf(),
            priorities: Vec::new(),
            paused: false,
        })
        .await?;

    let seen = next_state(&mut alerts, TorrentStateCode::Seeding).await?;
    let tracker_kinds: Vec<&str> = seen
        .iter()
        .filter(|alert| alert.kind.starts_with("tracker_"))
        .map(|alert| alert.kind.as_str())
        .collect();
    assert_eq!(tracker_kinds, vec![kinds::TRACKER_ERROR, kinds::TRACKER_REPLY]);
    adapter.shutdown().await?;
    Ok(())
}
