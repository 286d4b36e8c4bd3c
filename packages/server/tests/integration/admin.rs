use serde_json::json;

use crate::common::{TestApp, id_of, routes};

mod auth {
    use super::*;

    #[tokio::test]
    async fn admin_routes_reject_viewers() {
        let app = TestApp::spawn().await;

        let res = app
            .get_with_token(routes::STORAGE_ACCOUNTS, &app.token("viewer"))
            .await;
        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_invalid() {
        let app = TestApp::spawn().await;
        let forged = reelhouse::utils::jwt::sign(
            b"some-other-secret",
            uuid::Uuid::new_v4(),
            "admin",
            chrono::Duration::hours(1),
        )
        .unwrap();

        let res = app.get_with_token(routes::STORAGE_ACCOUNTS, &forged).await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }
}

mod storage_accounts {
    use super::*;

    #[tokio::test]
    async fn credentials_are_never_returned() {
        let app = TestApp::spawn().await;
        let created = app.create_account("acct_main", 10.0, 100.0).await;
        assert!(created["api_token"].is_null());
        assert_eq!(created["free_gb"], 90.0);

        let res = app
            .get_with_token(routes::STORAGE_ACCOUNTS, &app.admin_token())
            .await;
        assert_eq!(res.status, 200);
        assert!(!res.text.contains("\"api_token\""));
        assert_eq!(res.body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_limits_are_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .post_with_token(
                routes::STORAGE_ACCOUNTS,
                &json!({
                    "account_name": "acct",
                    "api_token": "acct",
                    "storage_limit_gb": 0.0,
                }),
                &app.admin_token(),
            )
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn upload_prefers_the_emptiest_account() {
        let app = TestApp::spawn().await;
        app.create_account("acct_busy", 9.0, 100.0).await;
        let roomy = app.create_account("acct_roomy", 1.0, 100.0).await;

        let video = app.upload_video("clip").await;
        assert_eq!(video["storage_account_id"], roomy["id"]);

        let res = app
            .get_with_token(routes::STORAGE_ACCOUNTS, &app.admin_token())
            .await;
        let roomy_now = res
            .body
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["id"] == roomy["id"])
            .unwrap()
            .clone();
        assert!(roomy_now["storage_used_gb"].as_f64().unwrap() > 1.0);
    }

    #[tokio::test]
    async fn deactivated_accounts_leave_no_capacity() {
        let app = TestApp::spawn().await;
        let account = app.create_account("acct_main", 0.0, 100.0).await;
        let id = account["id"].as_str().unwrap();

        let res = app
            .put_with_token(
                &routes::account_active(id),
                &json!({"is_active": false}),
                &app.admin_token(),
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["is_active"], false);

        let res = app
            .upload_with_token(b"data".to_vec(), &[("title", "clip")], &app.admin_token())
            .await;
        assert_eq!(res.status, 409);
        assert_eq!(res.body["code"], "NO_CAPACITY");
    }

    #[tokio::test]
    async fn file_over_the_per_account_cap_is_too_large() {
        let app = TestApp::spawn().await;
        // 10% of 0.11 GB is about 11.3 MiB.
        let account = app.create_account("acct_small", 0.0, 0.11).await;

        let res = app
            .upload_with_token(
                vec![0u8; 12 * 1024 * 1024],
                &[("title", "clip")],
                &app.admin_token(),
            )
            .await;
        assert_eq!(res.status, 413, "{}", res.text);
        assert_eq!(res.body["code"], "FILE_TOO_LARGE");
        assert!(res.body["message"].as_str().unwrap().contains("acct_small"));

        let res = app
            .get_with_token(routes::STORAGE_ACCOUNTS, &app.admin_token())
            .await;
        assert_eq!(res.body[0]["id"], account["id"]);
        assert_eq!(res.body[0]["storage_used_gb"], 0.0);
    }
}

mod videos {
    use super::*;

    #[tokio::test]
    async fn upload_requires_title_and_file() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;

        let res = app
            .upload_with_token(b"data".to_vec(), &[], &app.admin_token())
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn upload_parses_tags() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;

        let res = app
            .upload_with_token(
                b"data".to_vec(),
                &[("title", "clip"), ("tags", "music, live ,")],
                &app.admin_token(),
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
        assert_eq!(res.body["tags"], json!(["music", "live"]));
        assert_eq!(res.body["wrapper_token"].as_str().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn unpublished_video_is_hidden_from_public() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let video = app.upload_video("clip").await;
        let id = id_of(&video);

        let res = app
            .patch_with_token(
                &routes::admin_video(id),
                &json!({"is_published": false, "thumbnail_url": null}),
                &app.admin_token(),
            )
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        assert_eq!(app.get_without_token(&routes::video(id)).await.status, 404);
        let feed = app.get_without_token(routes::FEED).await;
        assert_eq!(feed.body["pagination"]["total"], 0);

        let res = app
            .get_with_token(&routes::admin_video(id), &app.admin_token())
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["is_published"], false);
    }

    #[tokio::test]
    async fn delete_removes_video_from_feed() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let id = id_of(&app.upload_video("clip").await);
        assert_eq!(
            app.get_without_token(routes::FEED).await.body["pagination"]["total"],
            1
        );

        let res = app
            .delete_with_token(&routes::admin_video(id), &app.admin_token())
            .await;
        assert_eq!(res.status, 204);

        assert_eq!(
            app.get_without_token(routes::FEED).await.body["pagination"]["total"],
            0
        );
        let res = app
            .delete_with_token(&routes::admin_video(id), &app.admin_token())
            .await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn manual_link_refresh_returns_new_expiry() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let id = id_of(&app.upload_video("clip").await);

        let res = app
            .post_with_token(&routes::refresh_link(id), &json!({}), &app.admin_token())
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["video_id"], id.to_string());
        assert!(res.body["source_url_expires_at"].is_string());
    }

    #[tokio::test]
    async fn sweep_reports_counts() {
        use reelhouse::catalog::CatalogStore;

        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        app.upload_video("fresh").await;
        let stale = id_of(&app.upload_video("stale").await);

        app.catalog
            .update_source_url(
                stale,
                "http://stale.test/old.mp4",
                chrono::Utc::now() + chrono::Duration::minutes(10),
            )
            .await
            .unwrap();

        let res = app
            .post_with_token(routes::LINK_REFRESH, &json!({}), &app.admin_token())
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["scanned"], 1);
        assert_eq!(res.body["refreshed"], 1);
        assert_eq!(res.body["failed"], 0);
    }
}
