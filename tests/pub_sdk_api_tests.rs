// tests/pub_sdk_api_tests.rs

use axum::http::StatusCode;
use axum::routing::post;
use axum::{serve, Json, Router};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Handle;

use rust_pubsdk::logging::remote_log::RemoteLogQueue;
use rust_pubsdk::model::cdb::{
    CdbRequest, CdbResponse, ContextData, MetricRequest, RemoteConfigRequest,
    RemoteConfigResponse, RemoteLogContext, RemoteLogRecord, RemoteLogRecords,
};
use rust_pubsdk::network::pub_sdk_api::{HttpPubSdkApi, PubSdkApi};
use rust_pubsdk::{
    AdSize, AdUnit, BidManager, CdbResponseSlot, SdkComponents, SdkError, SdkSettings,
};

/// 模拟 CDB：每个请求广告位返回一个随机出价
async fn handle_cdb(Json(request): Json<CdbRequest>) -> Json<CdbResponse> {
    let slots = request
        .slots
        .iter()
        .map(|slot| {
            let size = AdSize::parse(&slot.sizes[0]).unwrap_or(AdSize::new(320, 50));
            let cpm: f64 = rand::thread_rng().gen_range(1.0..3.0);
            CdbResponseSlot {
                impression_id: Some(slot.impression_id.clone()),
                placement_id: Some(slot.placement_id.clone()),
                cpm: format!("{:.2}", cpm),
                currency: Some("USD".to_string()),
                width: size.width,
                height: size.height,
                ttl_in_seconds: 3600,
                display_url: Some("https://mock-cdb.local/ad.js".to_string()),
                ..CdbResponseSlot::default()
            }
        })
        .collect();

    Json(CdbResponse {
        slots,
        time_to_next_call: 0,
    })
}

async fn handle_config(Json(_request): Json<RemoteConfigRequest>) -> Json<RemoteConfigResponse> {
    Json(RemoteConfigResponse {
        kill_switch: Some(false),
        live_bidding_enabled: Some(true),
        live_bidding_time_budget_in_millis: Some(500),
        prefetch_on_init_enabled: Some(true),
    })
}

async fn handle_csm(Json(_request): Json<MetricRequest>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn handle_logs(Json(_records): Json<Vec<RemoteLogRecords>>) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn start_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_mock_cdb() -> SocketAddr {
    let app = Router::new()
        .route("/inapp/v2", post(handle_cdb))
        .route("/config/app", post(handle_config))
        .route("/csm", post(handle_csm))
        .route("/inapp/logs", post(handle_logs));
    start_server(app).await
}

fn settings(addr: SocketAddr) -> SdkSettings {
    SdkSettings::new(&format!("http://{addr}/"), "B-056946", "com.example.app", "4.0.0")
}

fn request(api_settings: &SdkSettings) -> CdbRequest {
    serde_json::from_value(serde_json::json!({
        "id": "req-1",
        "publisher": { "bundleId": api_settings.bundle_id, "cpId": api_settings.cp_id },
        "user": { "deviceIdType": "gaid", "deviceOs": "android" },
        "sdkVersion": api_settings.sdk_version,
        "profileId": 235,
        "slots": [{ "impId": "imp-1", "placementId": "banner", "sizes": ["320x50"] }]
    }))
    .unwrap()
}

#[tokio::test]
async fn loads_bids_and_config_from_cdb() {
    let addr = start_mock_cdb().await;
    let settings = settings(addr);
    let api = HttpPubSdkApi::new(&settings).unwrap();

    let response = api.load_cdb(&request(&settings)).await.unwrap();
    assert_eq!(response.slots.len(), 1);
    let slot = response.slot_by_impression_id("imp-1").unwrap();
    assert!(slot.is_valid());
    assert_eq!((slot.width, slot.height), (320, 50));

    let config = api
        .load_config(&RemoteConfigRequest {
            cp_id: settings.cp_id.clone(),
            bundle_id: settings.bundle_id.clone(),
            sdk_version: settings.sdk_version.clone(),
            rtb_profile_id: 235,
            device_os: "android".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(config.live_bidding_time_budget_in_millis, Some(500));
}

#[tokio::test]
async fn telemetry_posts_accept_no_content() {
    let addr = start_mock_cdb().await;
    let api = HttpPubSdkApi::new(&settings(addr)).unwrap();

    let metrics = MetricRequest {
        feedbacks: vec![],
        wrapper_version: "4.0.0".to_string(),
        profile_id: 235,
    };
    api.post_csm(&metrics).await.unwrap();

    let logs = vec![RemoteLogRecords {
        context: RemoteLogContext {
            version: "4.0.0".to_string(),
            bundle_id: "com.example.app".to_string(),
            device_os: "android".to_string(),
        },
        errors: vec![RemoteLogRecord {
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            level: "WARN".to_string(),
            message: "CDB call failed".to_string(),
        }],
    }];
    api.post_logs(&logs).await.unwrap();
}

#[tokio::test]
async fn empty_body_is_an_empty_response() {
    let app = Router::new().route("/inapp/v2", post(|| async { StatusCode::NO_CONTENT }));
    let addr = start_server(app).await;
    let settings = settings(addr);
    let api = HttpPubSdkApi::new(&settings).unwrap();

    let response = api.load_cdb(&request(&settings)).await.unwrap();
    assert_eq!(response, CdbResponse::default());
}

#[tokio::test]
async fn error_status_is_reported() {
    let app = Router::new().route(
        "/inapp/v2",
        post(|| async { (StatusCode::BAD_REQUEST, "bad request") }),
    );
    let addr = start_server(app).await;
    let settings = settings(addr);
    let api = HttpPubSdkApi::new(&settings).unwrap();

    let err = api.load_cdb(&request(&settings)).await.unwrap_err();
    assert!(matches!(err, SdkError::HttpStatus(400)));
}

#[tokio::test]
async fn malformed_body_is_a_json_error() {
    let app = Router::new().route("/inapp/v2", post(|| async { "{not json" }));
    let addr = start_server(app).await;
    let settings = settings(addr);
    let api = HttpPubSdkApi::new(&settings).unwrap();

    let err = api.load_cdb(&request(&settings)).await.unwrap_err();
    assert!(matches!(err, SdkError::Json(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    // 先占一个端口再释放，保证没有服务在监听
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = settings(addr);
    let api = HttpPubSdkApi::new(&settings).unwrap();
    let err = api.load_cdb(&request(&settings)).await.unwrap_err();
    assert!(matches!(err, SdkError::Network(_)));
}

#[tokio::test]
async fn bid_manager_prefetches_and_serves_over_http() {
    let addr = start_mock_cdb().await;
    let components = SdkComponents::from_settings(
        settings(addr),
        Handle::current(),
        Arc::new(RemoteLogQueue::new(16)),
    )
    .unwrap();
    let manager = BidManager::new(components);
    let banner = AdUnit::banner("banner", AdSize::new(320, 50));

    manager.prefetch(&[banner.clone(), AdUnit::interstitial("interstitial")]);
    manager.wait_for_idle().await;

    assert_eq!(manager.cache().len(), 2);
    assert!(manager.config().snapshot().live_bidding_enabled);

    let bid = manager
        .get_bid_for_ad_unit_and_prefetch(&banner, ContextData::new())
        .expect("prefetched bid");
    assert!(bid.cpm_as_number() >= 1.0);
    manager.wait_for_idle().await;
    assert_eq!(manager.cache().len(), 2);
}
