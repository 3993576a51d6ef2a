//! File content integration tests.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use s3vfs_core::{FileType, VfsError};

    use crate::{cleanup_bucket, open_file_system, s3_client, test_bucket_name};

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_write_read_and_stat_file() {
        let client = s3_client();
        let bucket = test_bucket_name("files");
        let fs = open_file_system(&bucket).await.expect("connect");

        let file = fs.handle("docs/greeting.txt").unwrap();
        file.write_with_content_type(Bytes::from_static(b"hello, s3vfs!"), Some("text/plain"))
            .await
            .expect("write");

        assert_eq!(file.read().await.expect("read").as_ref(), b"hello, s3vfs!");
        let stat = file.stat().await.expect("stat");
        assert_eq!(stat.file_type, FileType::File);
        assert_eq!(stat.size, 13);
        assert_eq!(stat.content_type.as_deref(), Some("text/plain"));
        assert!(stat.last_modified.is_some());

        let head = client
            .head_object()
            .bucket(&bucket)
            .key("docs/greeting.txt")
            .send()
            .await
            .expect("head_object");
        assert_eq!(head.content_length(), Some(13));

        fs.close().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_read_ranges_and_append() {
        let client = s3_client();
        let bucket = test_bucket_name("range");
        let fs = open_file_system(&bucket).await.expect("connect");

        let file = fs.handle("log.txt").unwrap();
        file.write(Bytes::from_static(b"0123456789")).await.expect("write");
        assert_eq!(file.read_range(2, 3).await.expect("range").as_ref(), b"234");
        assert_eq!(file.read_range(8, 10).await.expect("tail").as_ref(), b"89");
        assert!(file.read_range(10, 4).await.expect("past end").is_empty());

        file.append(Bytes::from_static(b"ab")).await.expect("append");
        assert_eq!(file.read().await.unwrap().as_ref(), b"0123456789ab");

        fs.close().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_copy_and_move_file() {
        let client = s3_client();
        let bucket = test_bucket_name("move");
        let fs = open_file_system(&bucket).await.expect("connect");

        let src = fs.handle("a/src.bin").unwrap();
        src.write(Bytes::from_static(b"payload")).await.expect("write");

        let copy = fs.handle("b/copy.bin").unwrap();
        src.copy_to(&copy).await.expect("copy");
        assert_eq!(copy.read().await.unwrap().as_ref(), b"payload");
        assert!(src.exists().await.unwrap());

        let moved = fs.handle("c/moved.bin").unwrap();
        src.move_to(&moved).await.expect("move");
        assert!(!src.exists().await.unwrap());
        assert_eq!(moved.read().await.unwrap().as_ref(), b"payload");

        fs.close().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_report_missing_file_as_not_found() {
        let client = s3_client();
        let bucket = test_bucket_name("missing");
        let fs = open_file_system(&bucket).await.expect("connect");

        let file = fs.handle("nope.txt").unwrap();
        assert_eq!(file.file_type().await.unwrap(), FileType::Imaginary);
        assert!(file.read().await.unwrap_err().is_not_found());
        file.delete().await.expect("deleting nothing succeeds");

        let err = fs.handle("../escape").unwrap_err();
        assert!(matches!(err, VfsError::PathSyntax { .. }));

        fs.close().await;
        cleanup_bucket(&client, &bucket).await;
    }
}
