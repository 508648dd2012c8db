//! File Master Tests
//!
//! Each node is reduced to a transfer receiver on loopback. RPC addresses
//! point at a closed port, so servant offloading always falls back to the
//! primary.

#[cfg(test)]
mod tests {
    use crate::cluster::types::{Node, NodeId};
    use crate::config::{StorageDirs, TimeoutConfig};
    use crate::error::SdfsError;
    use crate::master::file_master::{FileMaster, MasterContext};
    use crate::master::protocol::ReadRequest;
    use crate::master::testing::{short_timeouts, test_context};
    use crate::metadata::types::{FileInfo, FileStatus};
    use crate::transfer::progress::TransmissionTracker;
    use crate::transfer::receiver::TransferReceiver;
    use crate::transfer::sender::send_file;
    use crate::transfer::types::{FrameHeader, ReceiverTag, WriteMode};
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Peer {
        _root: TempDir,
        dirs: StorageDirs,
        tracker: Arc<TransmissionTracker>,
        node: Node,
    }

    fn closed_port() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    async fn peer(id: &str) -> Peer {
        let root = tempfile::tempdir().unwrap();
        let dirs = StorageDirs::under(root.path());
        dirs.create_all().await.unwrap();
        let tracker = Arc::new(TransmissionTracker::new());
        let addr = TransferReceiver::new(dirs.clone(), tracker.clone())
            .start("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        Peer {
            _root: root,
            dirs,
            tracker,
            node: Node::alive(NodeId::from(id), closed_port(), addr),
        }
    }

    fn master_for(
        primary: &Peer,
        servants: &[&Node],
        timeouts: TimeoutConfig,
    ) -> (Arc<FileMaster>, Arc<MasterContext>) {
        let mut members: Vec<Node> = servants.iter().map(|n| (*n).clone()).collect();
        members.push(primary.node.clone());
        let ctx = test_context(
            primary.node.clone(),
            members,
            primary.dirs.clone(),
            primary.tracker.clone(),
            timeouts,
        );
        ctx.report.upsert(FileInfo::master(
            "f",
            primary.node.id.clone(),
            FileStatus::PendingUpload,
        ));
        let servant_ids = servants.iter().map(|n| n.id.clone()).collect();
        (FileMaster::new("f", servant_ids, ctx.clone()), ctx)
    }

    async fn wait_for_content(path: &Path, expected: &[u8]) {
        for _ in 0..100 {
            if let Ok(bytes) = tokio::fs::read(path).await
                && bytes == expected
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("{} never received the expected content", path.display());
    }

    async fn upload(primary: &Peer, transmission_id: &str, body: &[u8]) {
        let source = primary.dirs.local.join("upload.bin");
        tokio::fs::write(&source, body).await.unwrap();
        let header = FrameHeader::new(
            transmission_id,
            "f",
            ReceiverTag::SdfsStorage,
            WriteMode::Truncate,
        );
        send_file(&source, primary.node.transfer_addr, &header)
            .await
            .unwrap();
    }

    // ============================================================
    // READ TESTS
    // ============================================================

    #[tokio::test]
    async fn test_read_without_local_copy_is_not_found() {
        let primary = peer("p").await;
        let (fm, _) = master_for(&primary, &[], short_timeouts());

        let err = fm
            .read(ReadRequest {
                file_name: "f".into(),
                transmission_id: "CL-r-f-0".into(),
                requester_transfer_addr: closed_port(),
                local_output_name: "out".into(),
                tag: ReceiverTag::ClientLocal,
                mode: WriteMode::Truncate,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SdfsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_falls_back_to_primary() {
        let primary = peer("p").await;
        let servant = peer("s1").await;
        let requester = peer("r").await;
        tokio::fs::write(primary.dirs.sdfs.join("f"), b"primary copy")
            .await
            .unwrap();
        let (fm, _) = master_for(&primary, &[&servant.node], short_timeouts());

        fm.read(ReadRequest {
            file_name: "f".into(),
            transmission_id: "CL-r-f-0".into(),
            requester_transfer_addr: requester.node.transfer_addr,
            local_output_name: "out.txt".into(),
            tag: ReceiverTag::ClientLocal,
            mode: WriteMode::Truncate,
        })
        .await
        .unwrap();

        requester
            .tracker
            .wait_local("CL-r-f-0", Duration::from_secs(10))
            .await
            .unwrap();
        let got = tokio::fs::read(requester.dirs.local.join("out.txt"))
            .await
            .unwrap();
        assert_eq!(got, b"primary copy");
    }

    // ============================================================
    // WRITE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_write_fans_out_to_every_servant() {
        let primary = peer("p").await;
        let s1 = peer("s1").await;
        let s2 = peer("s2").await;
        let (fm, ctx) = master_for(&primary, &[&s1.node, &s2.node], short_timeouts());

        let id = fm.write().await.unwrap();
        assert!(id.starts_with("FM-p-f-"));
        upload(&primary, &id, b"v1 contents").await;
        fm.check_write_completed(&id).await.unwrap();

        let status = ctx.report.get("f").map(|e| e.status);
        assert_eq!(status, Some(FileStatus::Complete));
        wait_for_content(&s1.dirs.sdfs.join("f"), b"v1 contents").await;
        wait_for_content(&s2.dirs.sdfs.join("f"), b"v1 contents").await;
    }

    #[tokio::test]
    async fn test_unreachable_servant_does_not_block_completion() {
        let primary = peer("p").await;
        let s1 = peer("s1").await;
        let gone = Node::alive(NodeId::from("s2"), closed_port(), closed_port());
        let (fm, _) = master_for(&primary, &[&s1.node, &gone], short_timeouts());

        let id = fm.write().await.unwrap();
        upload(&primary, &id, b"partial").await;
        fm.check_write_completed(&id).await.unwrap();

        wait_for_content(&s1.dirs.sdfs.join("f"), b"partial").await;
    }

    #[tokio::test]
    async fn test_write_without_upload_times_out() {
        let primary = peer("p").await;
        let timeouts = TimeoutConfig {
            upload_wait_secs: 1,
            write_check_secs: 2,
            ..short_timeouts()
        };
        let (fm, _) = master_for(&primary, &[], timeouts);

        let id = fm.write().await.unwrap();
        let err = fm.check_write_completed(&id).await.unwrap_err();
        assert!(matches!(err, SdfsError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_second_write_waits_for_first() {
        let primary = peer("p").await;
        let (fm, _) = master_for(&primary, &[], short_timeouts());

        let first = fm.write().await.unwrap();
        let second = {
            let fm = fm.clone();
            tokio::spawn(async move { fm.write().await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!second.is_finished());

        upload(&primary, &first, b"first").await;
        fm.check_write_completed(&first).await.unwrap();

        let second = tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_ne!(first, second);
    }

    // ============================================================
    // REPLICATE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_replicate_copies_to_target() {
        let primary = peer("p").await;
        let target = peer("s1").await;
        tokio::fs::write(primary.dirs.sdfs.join("f"), b"replica")
            .await
            .unwrap();
        let (fm, _) = master_for(&primary, &[&target.node], short_timeouts());

        fm.replicate(target.node.transfer_addr).await.unwrap();
        wait_for_content(&target.dirs.sdfs.join("f"), b"replica").await;
    }

    #[tokio::test]
    async fn test_replicate_without_local_copy_fails() {
        let primary = peer("p").await;
        let target = peer("s1").await;
        let (fm, _) = master_for(&primary, &[&target.node], short_timeouts());

        let err = fm.replicate(target.node.transfer_addr).await.unwrap_err();
        assert!(matches!(err, SdfsError::NotFound(_)));
    }
}
