#![cfg(feature = "inmem-store")]

use actix_web::cookie::Cookie;
use actix_web::{test, App};
use ambient_frames::content::{ImageConfigStore, JsonArrayStore, JsonFileConfigStore};
use ambient_frames::gateway::{build_public_id, GatewayError, Section, UploadGateway, Uploaded};
use ambient_frames::matching::ReturnRecent;
use ambient_frames::repo::inmem::InMemRepo;
use ambient_frames::repo::Repo;
use ambient_frames::routes::{config, AppState};
use ambient_frames::session::{self, Claims};
use ambient_frames::storage::{PhotoStore, PhotoStoreError};
use serial_test::serial;
use std::sync::{Arc, Mutex};

/// Records uploads and deletes; `fail_deletes` simulates a CDN that refuses
/// to remove replaced objects.
#[derive(Default)]
struct MockGateway {
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    fail_deletes: bool,
}

#[async_trait::async_trait]
impl UploadGateway for MockGateway {
    async fn upload(&self, section: Section, name: &str, _bytes: Vec<u8>) -> Result<Uploaded, GatewayError> {
        let public_id = build_public_id(section, name, 1_700_000_000);
        self.uploads.lock().unwrap().push(public_id.clone());
        Ok(Uploaded { url: format!("https://cdn.test/{public_id}.jpg"), public_id })
    }
    async fn delete(&self, public_id: &str) -> Result<(), GatewayError> {
        if self.fail_deletes {
            return Err(GatewayError::Upstream("simulated outage".into()));
        }
        self.deletes.lock().unwrap().push(public_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct NullPhotoStore;

#[async_trait::async_trait]
impl PhotoStore for NullPhotoStore {
    async fn save(&self, _k: &str, _m: &str, _b: &[u8]) -> Result<String, PhotoStoreError> {
        Err(PhotoStoreError::Other("unused".into()))
    }
    async fn delete(&self, _k: &str) -> Result<(), PhotoStoreError> {
        Ok(())
    }
}

fn test_state(dir: &tempfile::TempDir, gateway: Arc<MockGateway>) -> AppState {
    std::env::set_var("SESSION_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("AF_DATA_DIR", dir.path().to_str().unwrap());
    let repo: Arc<dyn Repo> = Arc::new(InMemRepo::new());
    AppState {
        repo: repo.clone(),
        image_config: Arc::new(JsonFileConfigStore::new(dir.path().join("image-config.json"))),
        gallery: Arc::new(JsonArrayStore::new(dir.path().join("gallery.json"))),
        projects: Arc::new(JsonArrayStore::new(dir.path().join("projects.json"))),
        gateway,
        photo_store: Arc::new(NullPhotoStore),
        match_engine: Arc::new(ReturnRecent::new(repo)),
        rate_limiter: None,
    }
}

fn admin_cookie() -> Cookie<'static> {
    let token = session::sign(&Claims::new("marta", 3600), &session::secret_from_env());
    Cookie::new("af_session", token)
}

// Minimal 1x1 PNG (transparent)
fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

// Multipart body with one file field plus text fields
fn build_multipart(
    boundary: &str,
    file_field: &str,
    file_name: &str,
    bytes: &[u8],
    text: &[(&str, &str)],
) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in text {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{file_field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

#[actix_web::test]
#[serial]
async fn upload_updates_config_and_public_read() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let state = test_state(&dir, gateway.clone());
    let image_config = state.image_config.clone();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let (ct, body) = build_multipart(
        "B1",
        "file",
        "Hero Final.png",
        &sample_png(),
        &[("section", "home"), ("image_name", "hero_1")],
    );
    let req = test::TestRequest::post()
        .uri("/api/admin/images")
        .cookie(admin_cookie())
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["section"], "home");
    assert_eq!(v["image_id"], "hero_1");
    assert!(v["public_id"]
        .as_str()
        .unwrap()
        .starts_with("ambient-frames/home/hero_1_"));

    // config store has the entry
    let home = image_config.section("home").await.unwrap();
    assert_eq!(home.get("hero_1").unwrap().url, v["url"].as_str().unwrap());

    // public read sees it, without a session
    let req = test::TestRequest::get().uri("/api/images?section=home").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let public: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(public["hero_1"]["url"], v["url"]);
}

#[actix_web::test]
#[serial]
async fn replacing_deletes_old_object_best_effort() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let state = test_state(&dir, gateway.clone());
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let (ct, body) = build_multipart(
        "B2",
        "file",
        "hero.png",
        &sample_png(),
        &[
            ("section", "home"),
            ("image_name", "hero_1"),
            ("old_public_id", "ambient-frames/home/hero_1_100"),
        ],
    );
    let req = test::TestRequest::put()
        .uri("/api/admin/images")
        .cookie(admin_cookie())
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        gateway.deletes.lock().unwrap().as_slice(),
        ["ambient-frames/home/hero_1_100"]
    );
}

#[actix_web::test]
#[serial]
async fn failed_old_delete_does_not_abort_upload() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway { fail_deletes: true, ..Default::default() });
    let state = test_state(&dir, gateway.clone());
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let (ct, body) = build_multipart(
        "B3",
        "file",
        "hero.png",
        &sample_png(),
        &[
            ("section", "home"),
            ("image_name", "hero_1"),
            ("old_public_id", "ambient-frames/home/hero_1_100"),
        ],
    );
    let req = test::TestRequest::post()
        .uri("/api/admin/images")
        .cookie(admin_cookie())
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200, "orphaned remote object is accepted");
    assert_eq!(gateway.uploads.lock().unwrap().len(), 1);
}

#[actix_web::test]
#[serial]
async fn unknown_section_and_missing_fields_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let state = test_state(&dir, gateway);
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let (ct, body) = build_multipart(
        "B4",
        "file",
        "x.png",
        &sample_png(),
        &[("section", "checkout"), ("image_name", "hero_1")],
    );
    let req = test::TestRequest::post()
        .uri("/api/admin/images")
        .cookie(admin_cookie())
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let (ct, body) = build_multipart("B5", "file", "x.png", &sample_png(), &[("section", "home")]);
    let req = test::TestRequest::post()
        .uri("/api/admin/images")
        .cookie(admin_cookie())
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // the admin list and delete routes validate the section the same way
    let req = test::TestRequest::get()
        .uri("/api/admin/images?section=checkout")
        .cookie(admin_cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::delete()
        .uri("/api/admin/images?section=checkout&image_id=hero_1")
        .cookie(admin_cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn non_image_payload_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let state = test_state(&dir, gateway);
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let (ct, body) = build_multipart(
        "B6",
        "file",
        "notes.txt",
        b"just some text",
        &[("section", "home"), ("image_name", "hero_1")],
    );
    let req = test::TestRequest::post()
        .uri("/api/admin/images")
        .cookie(admin_cookie())
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 415);
}

#[actix_web::test]
#[serial]
async fn upload_and_sync_require_verified_session() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let state = test_state(&dir, gateway);
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    // A present-but-invalid cookie must not pass any image route.
    let garbage = Cookie::new("af_session", "present-but-invalid");
    let (ct, body) = build_multipart(
        "B7",
        "file",
        "x.png",
        &sample_png(),
        &[("section", "home"), ("image_name", "hero_1")],
    );
    let req = test::TestRequest::post()
        .uri("/api/admin/images")
        .cookie(garbage.clone())
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/admin/images/sync")
        .cookie(garbage)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial]
async fn sync_roundtrip_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let state = test_state(&dir, gateway.clone());
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let full = serde_json::json!({
        "home": {
            "hero_1": {"url": "https://cdn.test/h1.jpg", "public_id": "ambient-frames/home/h1_1"},
            "banner_1": {"url": "https://cdn.test/b1.jpg", "public_id": "ambient-frames/home/b1_1"}
        },
        "about": {
            "portrait": {"url": "https://cdn.test/p.jpg", "public_id": "ambient-frames/about/p_1"}
        }
    });
    let req = test::TestRequest::post()
        .uri("/api/admin/images/sync")
        .cookie(admin_cookie())
        .set_json(&full)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/admin/images/sync")
        .cookie(admin_cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    let got: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(got, full);

    // delete one entry; the CDN object goes too, the sibling stays
    let req = test::TestRequest::delete()
        .uri("/api/admin/images?section=home&image_id=hero_1")
        .cookie(admin_cookie())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        gateway.deletes.lock().unwrap().as_slice(),
        ["ambient-frames/home/h1_1"]
    );

    let req = test::TestRequest::get().uri("/api/images?section=home").to_request();
    let resp = test::call_service(&app, req).await;
    let home: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(home.get("hero_1").is_none());
    assert!(home.get("banner_1").is_some());
}
