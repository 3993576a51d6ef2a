//! Directory synthesis integration tests.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use s3vfs_core::{FileType, VfsError};

    use crate::{cleanup_bucket, open_file_system, s3_client, test_bucket_name};

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_create_folder_marker() {
        let client = s3_client();
        let bucket = test_bucket_name("mkdir");
        let fs = open_file_system(&bucket).await.expect("connect");

        let dir = fs.handle("reports/2024").unwrap();
        dir.create_folder().await.expect("create_folder");
        dir.create_folder().await.expect("create_folder is idempotent");
        assert_eq!(dir.file_type().await.unwrap(), FileType::Directory);

        let head = client
            .head_object()
            .bucket(&bucket)
            .key("reports/2024/")
            .send()
            .await
            .expect("marker object");
        assert_eq!(head.content_length(), Some(0));

        fs.close().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_list_children_from_prefixes() {
        let client = s3_client();
        let bucket = test_bucket_name("children");
        let fs = open_file_system(&bucket).await.expect("connect");

        for key in ["d/a.txt", "d/b.txt", "d/sub/deep/x", "other.txt"] {
            fs.handle(key)
                .unwrap()
                .write(Bytes::from_static(b"x"))
                .await
                .expect("write");
        }

        let dir = fs.handle("d").unwrap();
        assert_eq!(dir.file_type().await.unwrap(), FileType::Directory);
        let names: Vec<_> = dir
            .children()
            .await
            .expect("children")
            .iter()
            .filter_map(|c| c.path().name().map(str::to_owned))
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);

        assert!(matches!(
            fs.handle("other.txt").unwrap().children().await.unwrap_err(),
            VfsError::NotADirectory { .. }
        ));

        fs.close().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_delete_directories() {
        let client = s3_client();
        let bucket = test_bucket_name("rmdir");
        let fs = open_file_system(&bucket).await.expect("connect");

        for key in ["tree/a", "tree/b/c", "tree/b/d"] {
            fs.handle(key)
                .unwrap()
                .write(Bytes::from_static(b"x"))
                .await
                .expect("write");
        }

        let tree = fs.handle("tree").unwrap();
        assert!(matches!(
            tree.delete().await.unwrap_err(),
            VfsError::DirectoryNotEmpty { .. }
        ));
        assert_eq!(tree.delete_recursive().await.expect("delete_recursive"), 3);
        assert_eq!(tree.file_type().await.unwrap(), FileType::Imaginary);

        fs.close().await;
        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_move_directory() {
        let client = s3_client();
        let bucket = test_bucket_name("mvdir");
        let fs = open_file_system(&bucket).await.expect("connect");

        for key in ["src/one", "src/nested/two"] {
            fs.handle(key)
                .unwrap()
                .write(Bytes::from_static(b"x"))
                .await
                .expect("write");
        }

        let src = fs.handle("src").unwrap();
        let dst = fs.handle("dst").unwrap();
        src.move_to(&dst).await.expect("move");

        assert_eq!(src.file_type().await.unwrap(), FileType::Imaginary);
        assert_eq!(
            fs.handle("dst/nested/two").unwrap().read().await.unwrap().as_ref(),
            b"x"
        );

        fs.close().await;
        cleanup_bucket(&client, &bucket).await;
    }
}
