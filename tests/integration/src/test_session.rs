//! Session lifecycle integration tests.

#[cfg(test)]
mod tests {
    use s3vfs_core::{Capability, FileType, VfsError};

    use crate::{cleanup_bucket, open_file_system, s3_client, test_bucket_name};

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_create_missing_bucket_on_connect() {
        let client = s3_client();
        let bucket = test_bucket_name("connect");

        let fs = open_file_system(&bucket).await.expect("connect");
        client
            .head_bucket()
            .bucket(&bucket)
            .send()
            .await
            .expect("bucket should exist after connect");
        assert_eq!(fs.bucket(), bucket);
        assert_eq!(
            fs.handle("").unwrap().file_type().await.unwrap(),
            FileType::Directory
        );
        fs.close().await;

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_reuse_existing_bucket() {
        let client = s3_client();
        let bucket = test_bucket_name("reuse");

        let first = open_file_system(&bucket).await.expect("first connect");
        first
            .handle("kept.txt")
            .unwrap()
            .write("still here".into())
            .await
            .expect("write");
        first.close().await;

        let second = open_file_system(&bucket).await.expect("second connect");
        let content = second.handle("kept.txt").unwrap().read().await.expect("read");
        assert_eq!(content.as_ref(), b"still here");
        second.close().await;

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_reject_operations_after_close() {
        let client = s3_client();
        let bucket = test_bucket_name("close");

        let fs = open_file_system(&bucket).await.expect("connect");
        let file = fs.handle("f").unwrap();
        fs.close().await;
        fs.close().await;

        assert!(matches!(
            file.exists().await.unwrap_err(),
            VfsError::SessionClosed { .. }
        ));
        assert!(!fs.capabilities().supports(Capability::RandomAccessWrite));

        cleanup_bucket(&client, &bucket).await;
    }
}
