//! End-to-end tests against a real tonic server on an ephemeral port.

use catalog_service::pb::memory::Unit;
use catalog_service::pb::{
    CreateLaptopRequest, Cpu, Laptop, Memory, RateLaptopRequest, SearchLaptopRequest,
    UploadImageRequest,
};
use catalog_service::{
    grpc_server, sample, CatalogService, DiskImageStore, FilterBuilder, InMemoryLaptopStore,
    InMemoryRatingStore, LaptopServiceClient, LaptopStore, MAX_IMAGE_SIZE,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::{Channel, Server};
use tonic::Code;

/// Enough records that an unread search fills every transport buffer.
const CROWDED_STORE: usize = 50_000;

struct TestServer {
    client: LaptopServiceClient<Channel>,
    addr: SocketAddr,
    images: DiskImageStore,
    _dir: TempDir,
}

async fn start_server() -> TestServer {
    start_server_with(Arc::new(InMemoryLaptopStore::new())).await
}

async fn start_server_with(laptops: Arc<InMemoryLaptopStore>) -> TestServer {
    let dir = TempDir::new().unwrap();
    let images = DiskImageStore::new(dir.path());

    let service = Arc::new(CatalogService::new(
        laptops,
        Arc::new(DiskImageStore::new(dir.path())),
        Arc::new(InMemoryRatingStore::new()),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(grpc_server(service, Duration::from_secs(30)))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    TestServer {
        client: connect(addr).await,
        addr,
        images,
        _dir: dir,
    }
}

async fn connect(addr: SocketAddr) -> LaptopServiceClient<Channel> {
    LaptopServiceClient::connect(format!("http://{}", addr))
        .await
        .unwrap()
}

fn crowded_store() -> Arc<InMemoryLaptopStore> {
    let laptops = Arc::new(InMemoryLaptopStore::new());
    for _ in 0..CROWDED_STORE {
        laptops.save(&sample::new_laptop()).unwrap();
    }
    laptops
}

async fn assert_no_images(server: &TestServer) {
    let mut entries = tokio::fs::read_dir(server.images.directory()).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

async fn create(client: &mut LaptopServiceClient<Channel>, laptop: Laptop) -> String {
    client
        .create_laptop(CreateLaptopRequest {
            laptop: Some(laptop),
        })
        .await
        .unwrap()
        .into_inner()
        .id
}

#[tokio::test]
async fn test_create_laptop() {
    let mut server = start_server().await;
    let laptop = sample::new_laptop();
    let expected = laptop.id.clone();

    assert_eq!(create(&mut server.client, laptop.clone()).await, expected);

    let status = server
        .client
        .create_laptop(CreateLaptopRequest {
            laptop: Some(laptop),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::AlreadyExists);
}

#[tokio::test]
async fn test_create_laptop_rejects_bad_input() {
    let mut server = start_server().await;

    let status = server
        .client
        .create_laptop(CreateLaptopRequest { laptop: None })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let mut laptop = sample::new_laptop();
    laptop.id = "invalid-uuid".to_string();
    let status = server
        .client
        .create_laptop(CreateLaptopRequest {
            laptop: Some(laptop),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_search_laptop() {
    let mut server = start_server().await;

    let mut expected = Vec::new();
    for i in 0..6 {
        let mut laptop = sample::new_laptop();
        match i {
            0 => laptop.price_usd = 2500.0,
            1 => laptop.cpu = Some(Cpu { number_cores: 2, min_ghz: 3.0, ..Default::default() }),
            2 => laptop.cpu = Some(Cpu { number_cores: 4, min_ghz: 2.0, ..Default::default() }),
            3 => laptop.ram = Some(Memory::new(4096, Unit::Megabyte)),
            _ => {
                laptop.price_usd = 1999.0;
                laptop.cpu = Some(Cpu { number_cores: 4, min_ghz: 2.5, ..Default::default() });
                laptop.ram = Some(Memory::new(16, Unit::Gigabyte));
                expected.push(laptop.id.clone());
            }
        }
        create(&mut server.client, laptop).await;
    }

    let filter = FilterBuilder::new()
        .max_price_usd(2000.0)
        .min_cpu_cores(4)
        .min_cpu_ghz(2.2)
        .min_ram(8, Unit::Gigabyte)
        .build();

    let mut stream = server
        .client
        .search_laptop(SearchLaptopRequest {
            filter: Some(filter),
        })
        .await
        .unwrap()
        .into_inner();

    let mut found = Vec::new();
    while let Some(response) = stream.message().await.unwrap() {
        found.push(response.laptop.unwrap().id);
    }

    found.sort();
    expected.sort();
    assert_eq!(found, expected);
}

#[tokio::test]
async fn test_search_without_filter_returns_everything() {
    let mut server = start_server().await;
    for _ in 0..3 {
        create(&mut server.client, sample::new_laptop()).await;
    }

    let mut stream = server
        .client
        .search_laptop(SearchLaptopRequest { filter: None })
        .await
        .unwrap()
        .into_inner();

    let mut count = 0;
    while stream.message().await.unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_upload_image() {
    let mut server = start_server().await;
    let laptop_id = create(&mut server.client, sample::new_laptop()).await;

    let mut requests = vec![UploadImageRequest::info(laptop_id, ".jpg")];
    requests.extend((0..2).map(|_| UploadImageRequest::chunk(vec![7u8; 1024])));

    let response = server
        .client
        .upload_image(tokio_stream::iter(requests))
        .await
        .unwrap()
        .into_inner();

    assert!(!response.id.is_empty());
    assert_eq!(response.size, 2048);

    let path = server.images.image_path(&response.id, ".jpg");
    let written = tokio::fs::read(path).await.unwrap();
    assert_eq!(written, vec![7u8; 2048]);
}

#[tokio::test]
async fn test_upload_image_too_large() {
    let mut server = start_server().await;
    let laptop_id = create(&mut server.client, sample::new_laptop()).await;

    let half = MAX_IMAGE_SIZE / 2 + 1;
    let requests = vec![
        UploadImageRequest::info(laptop_id, ".png"),
        UploadImageRequest::chunk(vec![0u8; half]),
        UploadImageRequest::chunk(vec![0u8; half]),
    ];

    let status = server
        .client
        .upload_image(tokio_stream::iter(requests))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::InvalidArgument);
    assert_no_images(&server).await;
}

#[tokio::test]
async fn test_upload_image_unknown_laptop() {
    let mut server = start_server().await;

    let requests = vec![
        UploadImageRequest::info(uuid::Uuid::new_v4().to_string(), ".jpg"),
        UploadImageRequest::chunk(vec![0u8; 16]),
    ];

    let status = server
        .client
        .upload_image(tokio_stream::iter(requests))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn test_rate_laptop() {
    let mut server = start_server().await;
    let first = create(&mut server.client, sample::new_laptop()).await;
    let second = create(&mut server.client, sample::new_laptop()).await;

    let requests = vec![
        RateLaptopRequest { laptop_id: first.clone(), score: 8.0 },
        RateLaptopRequest { laptop_id: second.clone(), score: 3.0 },
        RateLaptopRequest { laptop_id: first.clone(), score: 6.0 },
    ];

    let mut stream = server
        .client
        .rate_laptop(tokio_stream::iter(requests))
        .await
        .unwrap()
        .into_inner();

    let mut responses = Vec::new();
    while let Some(response) = stream.message().await.unwrap() {
        responses.push(response);
    }

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].laptop_id, first);
    assert_eq!(responses[1].rated_count, 1);
    assert_eq!(responses[1].average_score, 3.0);
    assert_eq!(responses[2].rated_count, 2);
    assert_eq!(responses[2].average_score, 7.0);
}

#[tokio::test]
async fn test_rate_unknown_laptop() {
    let mut server = start_server().await;

    let requests = vec![RateLaptopRequest {
        laptop_id: "missing".to_string(),
        score: 5.0,
    }];

    let mut stream = server
        .client
        .rate_laptop(tokio_stream::iter(requests))
        .await
        .unwrap()
        .into_inner();

    let status = stream.message().await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_search_reader_releases_store_at_deadline() {
    let laptops = crowded_store();
    let mut server = start_server_with(laptops.clone()).await;

    let mut request = tonic::Request::new(SearchLaptopRequest { filter: None });
    request.set_timeout(Duration::from_millis(500));
    let mut stalled = server
        .client
        .search_laptop(request)
        .await
        .unwrap()
        .into_inner();

    // Separate connection: the stalled stream holds the first one's window.
    let mut writer = connect(server.addr).await;
    let created = tokio::time::timeout(
        Duration::from_secs(5),
        create(&mut writer, sample::new_laptop()),
    )
    .await;

    assert!(created.is_ok(), "create stayed blocked behind an expired search");
    assert_eq!(laptops.len().unwrap(), CROWDED_STORE + 1);

    let mut received = 0;
    let status = loop {
        match stalled.message().await {
            Ok(Some(_)) => received += 1,
            Ok(None) => panic!("search finished without reporting its deadline"),
            Err(status) => break status,
        }
    };

    assert_eq!(status.code(), Code::DeadlineExceeded);
    assert!(received < CROWDED_STORE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_search_stream_releases_store() {
    let laptops = crowded_store();
    let mut server = start_server_with(laptops.clone()).await;

    let stalled = server
        .client
        .search_laptop(SearchLaptopRequest { filter: None })
        .await
        .unwrap()
        .into_inner();
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(stalled);

    let mut writer = connect(server.addr).await;
    let created = tokio::time::timeout(
        Duration::from_secs(5),
        create(&mut writer, sample::new_laptop()),
    )
    .await;

    assert!(created.is_ok(), "create stayed blocked behind a dropped search");
    assert_eq!(laptops.len().unwrap(), CROWDED_STORE + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upload_interrupted_between_chunks_writes_nothing() {
    let mut server = start_server().await;
    let laptop_id = create(&mut server.client, sample::new_laptop()).await;

    let (tx, rx) = mpsc::channel(4);
    tx.send(UploadImageRequest::info(laptop_id, ".jpg")).await.unwrap();
    tx.send(UploadImageRequest::chunk(vec![1u8; 1024])).await.unwrap();

    let mut request = tonic::Request::new(ReceiverStream::new(rx));
    request.set_timeout(Duration::from_millis(300));

    let status = server.client.upload_image(request).await.unwrap_err();

    // The transport's own timeout may answer before the handler does.
    assert!(
        matches!(status.code(), Code::DeadlineExceeded | Code::Cancelled),
        "unexpected status {:?}",
        status
    );

    drop(tx);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_no_images(&server).await;
}
