//! Storage operations that may run as jobs.
//!
//! Records such as pools, volumes and file systems are passed through as
//! any serializable value, and results decode into whatever type the caller
//! asks for. Every call takes a `sync` flag: when set, a started job is
//! waited for and freed before returning.

use lsm_protocol::JobId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::client::Client;
use crate::error::{ClientError, ClientResult};
use crate::jobs::JobOutcome;

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a volume in a pool.
    pub async fn volume_create<T: DeserializeOwned>(
        &mut self,
        pool: &impl Serialize,
        volume_name: &str,
        size_bytes: u64,
        provisioning: u32,
        sync: bool,
    ) -> ClientResult<JobOutcome<T>> {
        let params = json!({
            "pool": pool,
            "volume_name": volume_name,
            "size_bytes": size_bytes,
            "provisioning": provisioning,
        });
        self.call_job_or_result("volume_create", params, sync).await
    }

    /// Deletes a volume.
    pub async fn volume_delete(
        &mut self,
        volume: &impl Serialize,
        sync: bool,
    ) -> ClientResult<Option<JobId>> {
        self.call_job_or_none("volume_delete", json!({"volume": volume}), sync)
            .await
    }

    /// Resizes a volume.
    pub async fn volume_resize<T: DeserializeOwned>(
        &mut self,
        volume: &impl Serialize,
        new_size_bytes: u64,
        sync: bool,
    ) -> ClientResult<JobOutcome<T>> {
        let params = json!({"volume": volume, "new_size_bytes": new_size_bytes});
        self.call_job_or_result("volume_resize", params, sync).await
    }

    /// Replicates a volume, into `pool` if given.
    pub async fn volume_replicate<T, P, V>(
        &mut self,
        pool: Option<&P>,
        rep_type: u32,
        source: &V,
        name: &str,
        sync: bool,
    ) -> ClientResult<JobOutcome<T>>
    where
        T: DeserializeOwned,
        P: Serialize,
        V: Serialize,
    {
        let params = json!({
            "pool": pool,
            "rep_type": rep_type,
            "volume_src": source,
            "name": name,
        });
        self.call_job_or_result("volume_replicate", params, sync)
            .await
    }

    /// Replicates block ranges from one volume to another.
    pub async fn volume_replicate_range(
        &mut self,
        rep_type: u32,
        source: &impl Serialize,
        dest: &impl Serialize,
        ranges: &impl Serialize,
        sync: bool,
    ) -> ClientResult<Option<JobId>> {
        let params = json!({
            "rep_type": rep_type,
            "volume_src": source,
            "volume_dest": dest,
            "ranges": ranges,
        });
        self.call_job_or_none("volume_replicate_range", params, sync)
            .await
    }

    /// Removes the child dependencies of a volume.
    pub async fn volume_child_dependency_rm(
        &mut self,
        volume: &impl Serialize,
        sync: bool,
    ) -> ClientResult<Option<JobId>> {
        self.call_job_or_none("volume_child_dependency_rm", json!({"volume": volume}), sync)
            .await
    }

    /// Creates a file system in a pool.
    pub async fn fs_create<T: DeserializeOwned>(
        &mut self,
        pool: &impl Serialize,
        name: &str,
        size_bytes: u64,
        sync: bool,
    ) -> ClientResult<JobOutcome<T>> {
        let params = json!({"pool": pool, "name": name, "size_bytes": size_bytes});
        self.call_job_or_result("fs_create", params, sync).await
    }

    /// Resizes a file system.
    pub async fn fs_resize<T: DeserializeOwned>(
        &mut self,
        fs: &impl Serialize,
        new_size_bytes: u64,
        sync: bool,
    ) -> ClientResult<JobOutcome<T>> {
        let params = json!({"fs": fs, "new_size_bytes": new_size_bytes});
        self.call_job_or_result("fs_resize", params, sync).await
    }

    /// Deletes a file system.
    pub async fn fs_delete(&mut self, fs: &impl Serialize, sync: bool) -> ClientResult<Option<JobId>> {
        self.call_job_or_none("fs_delete", json!({"fs": fs}), sync)
            .await
    }

    /// Clones a file system, from `snapshot` if given.
    pub async fn fs_clone<T, F, N>(
        &mut self,
        source: &F,
        dest_fs_name: &str,
        snapshot: Option<&N>,
        sync: bool,
    ) -> ClientResult<JobOutcome<T>>
    where
        T: DeserializeOwned,
        F: Serialize,
        N: Serialize,
    {
        let params = json!({
            "src_fs": source,
            "dest_fs_name": dest_fs_name,
            "snapshot": snapshot,
        });
        self.call_job_or_result("fs_clone", params, sync).await
    }

    /// Clones a file within a file system, from `snapshot` if given.
    pub async fn fs_file_clone<F, N>(
        &mut self,
        fs: &F,
        src_file_name: &str,
        dest_file_name: &str,
        snapshot: Option<&N>,
        sync: bool,
    ) -> ClientResult<Option<JobId>>
    where
        F: Serialize,
        N: Serialize,
    {
        let params = json!({
            "fs": fs,
            "src_file_name": src_file_name,
            "dest_file_name": dest_file_name,
            "snapshot": snapshot,
        });
        self.call_job_or_none("fs_file_clone", params, sync).await
    }

    /// Creates a snapshot of a file system.
    pub async fn fs_snapshot_create<T: DeserializeOwned>(
        &mut self,
        fs: &impl Serialize,
        snapshot_name: &str,
        sync: bool,
    ) -> ClientResult<JobOutcome<T>> {
        let params = json!({"fs": fs, "snapshot_name": snapshot_name});
        self.call_job_or_result("fs_snapshot_create", params, sync)
            .await
    }

    /// Deletes a file system snapshot.
    pub async fn fs_snapshot_delete(
        &mut self,
        fs: &impl Serialize,
        snapshot: &impl Serialize,
        sync: bool,
    ) -> ClientResult<Option<JobId>> {
        let params = json!({"fs": fs, "snapshot": snapshot});
        self.call_job_or_none("fs_snapshot_delete", params, sync)
            .await
    }

    /// Restores a file system, or selected files, from a snapshot.
    ///
    /// Unless `all_files` is set, `files` must be non-empty and as long as
    /// `restore_files`.
    pub async fn fs_snapshot_restore(
        &mut self,
        fs: &impl Serialize,
        snapshot: &impl Serialize,
        all_files: bool,
        files: &[&str],
        restore_files: &[&str],
        sync: bool,
    ) -> ClientResult<Option<JobId>> {
        if !all_files {
            if files.is_empty() {
                return Err(ClientError::invalid_argument(
                    "'files' is empty and 'all_files' is false",
                ));
            }
            if files.len() != restore_files.len() {
                return Err(ClientError::invalid_argument(
                    "'files' and 'restore_files' have different lengths",
                ));
            }
        }

        let params = json!({
            "fs": fs,
            "snapshot": snapshot,
            "files": files,
            "restore_files": restore_files,
            "all_files": all_files,
        });
        self.call_job_or_none("fs_snapshot_restore", params, sync)
            .await
    }

    /// Removes the child dependencies of a file system or of some files.
    pub async fn fs_child_dependency_rm(
        &mut self,
        fs: &impl Serialize,
        files: &[&str],
        sync: bool,
    ) -> ClientResult<Option<JobId>> {
        let params = json!({"fs": fs, "files": files});
        self.call_job_or_none("fs_child_dependency_rm", params, sync)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{ok, scripted};
    use crate::config::ClientConfig;
    use lsm_protocol::ErrorCode;
    use serde_json::Value;

    #[tokio::test]
    async fn volume_create_immediate_value() {
        let (mut client, peer) = scripted(
            ClientConfig::default(),
            vec![ok(json!([null, {"id": "V1", "name": "data"}]))],
        );

        let outcome: JobOutcome<Value> = client
            .volume_create(&json!({"id": "P1"}), "data", 1 << 30, 1, true)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Done(Some(json!({"id": "V1", "name": "data"})))
        );

        drop(client);
        let requests = peer.await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].params_value(),
            json!({
                "pool": {"id": "P1"},
                "volume_name": "data",
                "size_bytes": 1u64 << 30,
                "provisioning": 1,
                "flags": 0
            })
        );
    }

    #[tokio::test]
    async fn volume_replicate_without_pool_sends_null() {
        let (mut client, peer) = scripted(ClientConfig::default(), vec![ok(json!(["JOB_1", null]))]);

        let outcome: JobOutcome<Value> = client
            .volume_replicate(None::<&Value>, 2, &json!({"id": "V1"}), "copy", false)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Pending(JobId::new("JOB_1")));

        drop(client);
        let requests = peer.await.unwrap();
        assert_eq!(requests[0].params["pool"], Value::Null);
        assert_eq!(requests[0].params["volume_src"], json!({"id": "V1"}));
    }

    #[tokio::test]
    async fn volume_delete_async_returns_job() {
        let (mut client, _peer) = scripted(ClientConfig::default(), vec![ok(json!("JOB_2"))]);
        let job = client
            .volume_delete(&json!({"id": "V1"}), false)
            .await
            .unwrap();
        assert_eq!(job, Some(JobId::new("JOB_2")));
    }

    #[tokio::test]
    async fn fs_snapshot_restore_validates_file_lists() {
        let (mut client, peer) = scripted(ClientConfig::default(), vec![]);
        let fs = json!({"id": "FS1"});
        let snapshot = json!({"id": "SS1"});

        let error = client
            .fs_snapshot_restore(&fs, &snapshot, false, &[], &[], true)
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::InvalidArgument);

        let error = client
            .fs_snapshot_restore(&fs, &snapshot, false, &["a", "b"], &["c"], true)
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::InvalidArgument);

        drop(client);
        assert!(peer.await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fs_snapshot_restore_all_files() {
        let (mut client, peer) = scripted(ClientConfig::default(), vec![ok(Value::Null)]);
        let job = client
            .fs_snapshot_restore(&json!({"id": "FS1"}), &json!({"id": "SS1"}), true, &[], &[], true)
            .await
            .unwrap();
        assert!(job.is_none());

        drop(client);
        let requests = peer.await.unwrap();
        assert_eq!(requests[0].method, "fs_snapshot_restore");
        assert_eq!(requests[0].params["all_files"], json!(true));
        assert_eq!(requests[0].params["files"], json!([]));
    }

    #[tokio::test]
    async fn fs_clone_from_snapshot() {
        let (mut client, peer) =
            scripted(ClientConfig::default(), vec![ok(json!([null, {"id": "FS2"}]))]);

        let outcome: JobOutcome<Value> = client
            .fs_clone(&json!({"id": "FS1"}), "clone", Some(&json!({"id": "SS1"})), true)
            .await
            .unwrap();
        assert_eq!(outcome.into_value(), Some(json!({"id": "FS2"})));

        drop(client);
        let requests = peer.await.unwrap();
        assert_eq!(requests[0].params["snapshot"], json!({"id": "SS1"}));
        assert_eq!(requests[0].params["dest_fs_name"], json!("clone"));
    }
}
