//! ACL integration tests.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use s3vfs_core::{AclPermission, Actor};

    use crate::{cleanup_bucket, open_file_system, s3_client, test_bucket_name};

    const ALL_PAIRS: [(Actor, AclPermission); 6] = [
        (Actor::Owner, AclPermission::Read),
        (Actor::Owner, AclPermission::Write),
        (Actor::AuthorizedUsers, AclPermission::Read),
        (Actor::AuthorizedUsers, AclPermission::Write),
        (Actor::Everyone, AclPermission::Read),
        (Actor::Everyone, AclPermission::Write),
    ];

    #[tokio::test]
    #[ignore = "requires running S3 endpoint"]
    async fn test_should_grant_and_revoke_access() {
        let client = s3_client();
        let bucket = test_bucket_name("acl");
        let fs = open_file_system(&bucket).await.expect("connect");

        let file = fs.handle("acl/check_acl.zip").unwrap();
        file.write(Bytes::from_static(b"PK\x03\x04")).await.expect("write");

        let initial = file.get_acl().await.expect("get_acl");
        assert!(initial.is_allowed(Actor::Owner, AclPermission::Read));
        assert!(initial.is_allowed(Actor::Owner, AclPermission::Write));
        assert!(initial.permissions(Actor::Everyone).is_empty());

        let mut public = initial.clone();
        public.allow(Actor::Everyone, AclPermission::Read);
        file.set_acl(&public).await.expect("set_acl");
        let after = file.get_acl().await.expect("get_acl");
        assert_eq!(after, public);

        let grants = client
            .get_object_acl()
            .bucket(&bucket)
            .key("acl/check_acl.zip")
            .send()
            .await
            .expect("get_object_acl");
        assert!(grants.grants().iter().any(|g| {
            g.grantee().and_then(|e| e.uri())
                == Some("http://acs.amazonaws.com/groups/global/AllUsers")
        }));

        let mut authorized = after.clone();
        authorized.allow_actor(Actor::AuthorizedUsers);
        file.set_acl(&authorized).await.expect("set_acl");
        assert_eq!(file.get_acl().await.unwrap(), authorized);

        let mut denied = authorized;
        denied.deny_all();
        file.set_acl(&denied).await.expect("set_acl");
        let final_acl = file.get_acl().await.expect("get_acl");
        for (actor, permission) in ALL_PAIRS {
            assert!(final_acl.is_denied(actor, permission), "{actor}/{permission}");
        }

        fs.close().await;
        cleanup_bucket(&client, &bucket).await;
    }
}
