use serde_json::json;

use crate::common::{MEDIA_URL, TestApp, id_of, routes};

mod feed {
    use super::*;

    #[tokio::test]
    async fn empty_feed_has_no_pages() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(routes::FEED).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["data"], json!([]));
        assert_eq!(res.body["pagination"]["total"], 0);
        assert_eq!(res.body["pagination"]["total_pages"], 0);
    }

    #[tokio::test]
    async fn uploaded_videos_appear_without_source_urls() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        app.upload_video("first").await;
        app.upload_video("second").await;

        let res = app.get_without_token(&routes::feed_page(1, 1)).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["pagination"]["total"], 2);
        assert_eq!(res.body["pagination"]["total_pages"], 2);

        let item = &res.body["data"][0];
        assert!(item["source_url"].is_null());
        assert!(
            item["stream_url"]
                .as_str()
                .unwrap()
                .starts_with("/api/v1/stream/")
        );
    }

    #[tokio::test]
    async fn per_page_is_clamped() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token(&routes::feed_page(0, 1000)).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["pagination"]["page"], 1);
        assert_eq!(res.body["pagination"]["per_page"], 100);
    }

    #[tokio::test]
    async fn huge_page_number_is_clamped() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        app.upload_video("clip").await;

        let res = app.get_without_token(&routes::feed_page(u64::MAX, 100)).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["pagination"]["page"], 10_000);
        assert_eq!(res.body["data"], json!([]));
        assert_eq!(res.body["pagination"]["total"], 1);
    }

    #[tokio::test]
    async fn like_is_visible_on_next_feed_read() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let video = app.upload_video("clip").await;

        // Populate the cache first.
        let before = app.get_without_token(routes::FEED).await;
        assert_eq!(before.body["data"][0]["like_count"], 0);

        let res = app
            .post_with_token(&routes::like(id_of(&video)), &json!({}), &app.token("viewer"))
            .await;
        assert_eq!(res.status, 200, "{}", res.text);

        let after = app.get_without_token(routes::FEED).await;
        assert_eq!(after.body["data"][0]["like_count"], 1);
    }
}

mod views {
    use super::*;

    #[tokio::test]
    async fn session_counts_once_after_crossing_threshold() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let id = id_of(&app.upload_video("clip").await);

        let report = |watched: f64| {
            json!({
                "session_id": "sess-1",
                "watch_duration_seconds": watched,
                "video_duration_seconds": 100.0,
            })
        };

        let res = app.post_without_token(&routes::views(id), &report(10.0)).await;
        assert_eq!(res.status, 202, "{}", res.text);
        assert_eq!(res.body["counted"], false);

        let res = app.post_without_token(&routes::views(id), &report(35.0)).await;
        assert_eq!(res.body["counted"], true);

        let res = app.post_without_token(&routes::views(id), &report(90.0)).await;
        assert_eq!(res.body["counted"], false);

        let video = app.get_without_token(&routes::video(id)).await;
        assert_eq!(video.body["view_count"], 1);
    }

    #[tokio::test]
    async fn unknown_video_is_not_found() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                &routes::views(uuid::Uuid::new_v4()),
                &json!({
                    "session_id": "s",
                    "watch_duration_seconds": 50.0,
                    "video_duration_seconds": 100.0,
                }),
            )
            .await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn malformed_report_is_a_validation_error() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let id = id_of(&app.upload_video("clip").await);

        let res = app
            .post_without_token(&routes::views(id), &json!({"session_id": "s"}))
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod likes {
    use super::*;

    #[tokio::test]
    async fn like_requires_a_token() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let id = id_of(&app.upload_video("clip").await);

        let res = app.post_without_token(&routes::like(id), &json!({})).await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");

        let res = app
            .post_with_token(&routes::like(id), &json!({}), "not-a-jwt")
            .await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn double_like_and_double_unlike_conflict() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let id = id_of(&app.upload_video("clip").await);
        let token = app.token("viewer");

        let res = app.post_with_token(&routes::like(id), &json!({}), &token).await;
        assert_eq!(res.body["like_count"], 1);

        let res = app.post_with_token(&routes::like(id), &json!({}), &token).await;
        assert_eq!(res.status, 409);

        let res = app.delete_with_token(&routes::like(id), &token).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["like_count"], 0);

        let res = app.delete_with_token(&routes::like(id), &token).await;
        assert_eq!(res.status, 409);
    }
}

mod discovery {
    use super::*;

    fn titles(body: &serde_json::Value) -> Vec<String> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|v| v["title"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn search_filters_by_tag_category_and_keyword() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        app.upload_classified("Piano cover", "music", "piano,cover").await;
        app.upload_classified("Guitar lesson", "music", "guitar").await;
        app.upload_classified("Pasta at home", "cooking", "pasta").await;

        let res = app
            .get_without_token(&format!("{}?category=music", routes::SEARCH))
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["pagination"]["total"], 2);

        let res = app
            .get_without_token(&format!("{}?category=music&tag=guitar", routes::SEARCH))
            .await;
        assert_eq!(titles(&res.body["data"]), vec!["Guitar lesson"]);
        assert_eq!(res.body["data"][0]["category"], "music");

        let res = app
            .get_without_token(&format!("{}?q=PASTA", routes::SEARCH))
            .await;
        assert_eq!(titles(&res.body["data"]), vec!["Pasta at home"]);

        let res = app
            .get_without_token(&format!("{}?q=&tag=", routes::SEARCH))
            .await;
        assert_eq!(res.body["pagination"]["total"], 3);
    }

    #[tokio::test]
    async fn related_videos_share_category_or_tag() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let origin = id_of(&app.upload_classified("origin", "music", "piano").await);
        app.upload_classified("same category", "music", "drums").await;
        app.upload_classified("same tag", "talk", "piano").await;
        app.upload_classified("unrelated", "cooking", "pasta").await;

        let res = app.get_without_token(&routes::related(origin)).await;
        assert_eq!(res.status, 200, "{}", res.text);
        let mut found = titles(&res.body);
        found.sort();
        assert_eq!(found, vec!["same category", "same tag"]);

        let res = app
            .get_without_token(&format!("{}?limit=1", routes::related(origin)))
            .await;
        assert_eq!(res.body.as_array().unwrap().len(), 1);

        let res = app
            .get_without_token(&routes::related(uuid::Uuid::new_v4()))
            .await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn liked_list_and_status_follow_the_caller() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let liked = id_of(&app.upload_video("liked").await);
        let other = id_of(&app.upload_video("other").await);
        let token = app.token("viewer");

        let res = app.get_without_token(routes::LIKED).await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");

        let res = app.post_with_token(&routes::like(liked), &json!({}), &token).await;
        assert_eq!(res.status, 200, "{}", res.text);

        let res = app.get_with_token(routes::LIKED, &token).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(titles(&res.body["data"]), vec!["liked"]);

        let res = app.get_with_token(routes::LIKED, &app.token("viewer")).await;
        assert_eq!(res.body["pagination"]["total"], 0);

        let res = app.get_with_token(&routes::like(liked), &token).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["liked"], true);

        let res = app.get_with_token(&routes::like(other), &token).await;
        assert_eq!(res.body["liked"], false);

        let res = app.get_without_token(&routes::like(liked)).await;
        assert_eq!(res.status, 401);
    }
}

mod stream {
    use super::*;

    #[tokio::test]
    async fn wrapper_token_redirects_to_source() {
        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let video = app.upload_video("clip").await;

        let res = app
            .get_without_token(video["stream_url"].as_str().unwrap())
            .await;
        assert_eq!(res.status, 307, "{}", res.text);
        let location = res.location.expect("redirect without Location");
        assert!(
            location.starts_with(&format!("{MEDIA_URL}/acct_main/")),
            "{location}"
        );
    }

    #[tokio::test]
    async fn expired_link_is_refreshed_before_redirect() {
        use reelhouse::catalog::CatalogStore;

        let app = TestApp::spawn().await;
        app.create_account("acct_main", 0.0, 100.0).await;
        let video = app.upload_video("clip").await;
        let id = id_of(&video);

        app.catalog
            .update_source_url(
                id,
                "http://stale.test/old.mp4",
                chrono::Utc::now() - chrono::Duration::minutes(5),
            )
            .await
            .unwrap();

        let res = app
            .get_without_token(video["stream_url"].as_str().unwrap())
            .await;
        assert_eq!(res.status, 307);
        assert!(res.location.unwrap().starts_with(MEDIA_URL));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let app = TestApp::spawn().await;

        let res = app.get_without_token("/api/v1/stream/nope").await;
        assert_eq!(res.status, 404);
    }
}
