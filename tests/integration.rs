use std::sync::Once;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use musicbrainz_rpc::{
    //
    Command,
    Error,
    MemoryBroker,
    MemoryDelivery,
    ReleaseInfo,
    ReleaseQuery,
    Result,
    RpcClient,
    RpcConfig,
    SearchReply,
    ServiceClient,
    ServiceInfo,
    Suggestion,
    SuggestionSet,
    MUSICBRAINZ_QUEUE,
};

/// Catalog id the fixture recognizes, same release as the descriptive query.
const DARK_SIDE_ID: &str = "956fbc58-362d-43b8-b880-3779e0508559";
const DARK_SIDE_TITLE: &str = "The Dark Side of the Moon";

static INIT: Once = Once::new();

fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// In-process stand-in for the MusicBrainz lookup service.
///
/// Consumes the `musicbrainz` queue on a memory broker and answers each
/// command to its `reply_to` queue with the request's correlation id.
struct MusicbrainzService {
    // ---
    handle: JoinHandle<()>,
    broker: MemoryBroker,
}

impl MusicbrainzService {
    // ---
    async fn start() -> Result<Self> {
        // ---
        let broker = MemoryBroker::new();
        let mut requests = broker.declare(MUSICBRAINZ_QUEUE).await?;

        let responder = broker.clone();
        let handle = tokio::spawn(async move {
            // ---
            while let Some(delivery) = requests.recv().await {
                let Some(reply_to) = delivery.reply_to.clone() else {
                    continue;
                };

                let payload = match Command::from_slice(&delivery.payload) {
                    Ok(cmd) => answer(&cmd),
                    Err(_) => Bytes::new(),
                };

                responder
                    .publish(
                        &reply_to,
                        MemoryDelivery {
                            reply_to: None,
                            correlation_id: delivery.correlation_id.clone(),
                            payload,
                        },
                    )
                    .await;
            }
        });

        Ok(Self { handle, broker })
    }

    async fn client(&self) -> Result<ServiceClient> {
        // ---
        let config = RpcConfig::memory(MUSICBRAINZ_QUEUE);
        let (session, inbox) = self.broker.open_session(&config).await?;
        let rpc = RpcClient::with_session(session, inbox, config.service_queue);
        Ok(ServiceClient::new(rpc))
    }

    fn broker(&self) -> MemoryBroker {
        self.broker.clone()
    }

    fn shutdown(self) {
        // ---
        self.handle.abort();
    }
}

/// Build the fixture's reply body for one command.
fn answer(cmd: &Command) -> Bytes {
    // ---
    match cmd {
        Command::Ping { .. } => Bytes::new(),
        Command::Info { .. } => {
            let info = ServiceInfo {
                subsystem: "audio".to_string(),
                name: MUSICBRAINZ_QUEUE.to_string(),
                description: "Musicbrainz service client".to_string(),
            };
            Bytes::from(serde_json::to_vec(&info).unwrap())
        }
        Command::Release { release } => {
            let reply = lookup(release);
            Bytes::from(serde_json::to_vec(&reply).unwrap())
        }
    }
}

/// Fixture lookup rules: the known catalog id and the canonical title both
/// resolve to the same release; any other titled query echoes its title
/// back as a weak match.
fn lookup(release: &ReleaseQuery) -> SearchReply {
    // ---
    let by_id = release
        .ids
        .as_ref()
        .and_then(|ids| ids.get("musicbrainz"))
        .is_some_and(|id| id == DARK_SIDE_ID);
    let by_title = release
        .title
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case(DARK_SIDE_TITLE));

    let suggestions = if by_id || by_title {
        vec![Suggestion {
            release: ReleaseInfo {
                title: DARK_SIDE_TITLE.to_string(),
                year: Some(1973),
                ids: [("musicbrainz".to_string(), DARK_SIDE_ID.to_string())]
                    .into_iter()
                    .collect(),
            },
            service_name: MUSICBRAINZ_QUEUE.to_string(),
            source_similarity: if by_id { 1.0 } else { 0.83 },
        }]
    } else if let Some(title) = &release.title {
        vec![Suggestion {
            release: ReleaseInfo {
                title: title.clone(),
                year: release.year,
                ids: Default::default(),
            },
            service_name: MUSICBRAINZ_QUEUE.to_string(),
            source_similarity: 0.5,
        }]
    } else {
        Vec::new()
    };

    SearchReply {
        suggestion_set: SuggestionSet { suggestions },
    }
}

#[tokio::test]
async fn test_ping_returns_empty_payload() -> Result<()> {
    // ---
    init_logging();

    let service = MusicbrainzService::start().await?;
    let client = service.client().await?;

    let reply = client.ping().await?;
    assert!(reply.is_empty());

    client.close().await?;
    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_info_reports_service_name() -> Result<()> {
    // ---
    init_logging();

    let service = MusicbrainzService::start().await?;
    let client = service.client().await?;

    let info = client.info().await?;
    assert_eq!(info.name, client.queue());

    client.close().await?;
    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_release_by_catalog_id() -> Result<()> {
    // ---
    init_logging();

    let service = MusicbrainzService::start().await?;
    let client = service.client().await?;

    let reply = client
        .search_by_release(&ReleaseQuery::by_id("musicbrainz", DARK_SIDE_ID))
        .await?;

    let release = reply.first_release().expect("no suggestions");
    assert_eq!(release.title.to_lowercase(), "the dark side of the moon");

    client.close().await?;
    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_search_by_incomplete_data() -> Result<()> {
    // ---
    init_logging();

    let service = MusicbrainzService::start().await?;
    let client = service.client().await?;

    // Same release as the id lookup, described loosely.
    let query = ReleaseQuery::default()
        .with_year(1977)
        .with_title("The Dark Side Of The Moon")
        .with_publishing("Harvest", "SHVL 804")
        .with_actor_role("Pink Floyd", "performer");

    let reply = client.search_by_release(&query).await?;

    let release = reply.first_release().expect("no suggestions");
    assert_eq!(release.title.to_lowercase(), "the dark side of the moon");

    client.close().await?;
    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_concurrent_calls_match_their_own_replies() {
    // ---
    init_logging();

    let service = MusicbrainzService::start().await.unwrap();
    let client = service.client().await.unwrap();

    let mut handles = Vec::new();

    // Distinct titles; every call must get its own echo back.
    for i in 0..10 {
        let rpc = client.rpc().clone();

        handles.push(tokio::spawn(async move {
            // ---
            let query = ReleaseQuery::default().with_title(format!("Album {i}"));
            let reply = rpc.call(&Command::release(query)).await.unwrap();
            let reply: SearchReply = serde_json::from_slice(&reply).unwrap();
            reply.first_release().unwrap().title.clone()
        }));
    }

    for (i, task) in handles.into_iter().enumerate() {
        let title = task.await.unwrap();
        assert_eq!(title, format!("Album {i}"));
    }

    assert_eq!(client.rpc().stale_replies(), 0);

    client.close().await.unwrap();
    service.shutdown();
}

#[tokio::test]
async fn test_overlapping_calls_both_resolve() -> Result<()> {
    // ---
    init_logging();

    let service = MusicbrainzService::start().await?;
    let client = service.client().await?;

    // Second call starts while the first is still unresolved; neither may
    // crash or steal the other's reply.
    let query_one = ReleaseQuery::default().with_title("First");
    let query_two = ReleaseQuery::default().with_title("Second");
    let first = client.search_by_release(&query_one);
    let second = client.search_by_release(&query_two);

    let (first, second) = tokio::join!(first, second);

    assert_eq!(first?.first_release().unwrap().title, "First");
    assert_eq!(second?.first_release().unwrap().title, "Second");

    client.close().await?;
    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_foreign_token_reply_is_skipped_while_call_outstanding() -> Result<()> {
    // ---
    init_logging();

    // A service that answers every request twice: first under a token no
    // call owns, then under the real one. The call must resolve with the
    // correctly correlated payload and the foreign one must only show up
    // in the stale counter.
    let broker = MemoryBroker::new();
    let mut requests = broker.declare("noisy-service").await?;

    let responder = broker.clone();
    let handle = tokio::spawn(async move {
        // ---
        while let Some(delivery) = requests.recv().await {
            let Some(reply_to) = delivery.reply_to.clone() else {
                continue;
            };
            responder
                .publish(
                    &reply_to,
                    MemoryDelivery {
                        reply_to: None,
                        correlation_id: Some("foreign-token".to_string()),
                        payload: Bytes::from("wrong"),
                    },
                )
                .await;
            responder
                .publish(
                    &reply_to,
                    MemoryDelivery {
                        reply_to: None,
                        correlation_id: delivery.correlation_id.clone(),
                        payload: Bytes::from("right"),
                    },
                )
                .await;
        }
    });

    let config = RpcConfig::memory("noisy-service");
    let (session, inbox) = broker.open_session(&config).await?;
    let rpc = RpcClient::with_session(session, inbox, config.service_queue);

    let reply = rpc.call(&Command::ping()).await?;
    assert_eq!(reply, Bytes::from("right"));
    assert_eq!(rpc.stale_replies(), 1);

    rpc.close().await?;
    handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_stale_reply_is_dropped_and_counted() -> Result<()> {
    // ---
    init_logging();

    let service = MusicbrainzService::start().await?;
    let client = service.client().await?;
    let broker = service.broker();

    // A reply nobody asked for, delivered straight to the client's inbox.
    broker
        .publish(
            client.rpc().reply_queue(),
            MemoryDelivery {
                reply_to: None,
                correlation_id: Some("no-such-call".to_string()),
                payload: Bytes::from("orphan"),
            },
        )
        .await;

    // A later real call still works; inbox order guarantees the orphan was
    // processed first.
    let reply = client.ping().await?;
    assert!(reply.is_empty());
    assert_eq!(client.rpc().stale_replies(), 1);

    client.close().await?;
    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_timeout_when_service_never_answers() -> Result<()> {
    // ---
    init_logging();

    // No service consumes this queue; the publish vanishes unroutable.
    let broker = MemoryBroker::new();
    let config = RpcConfig::memory("lazy-service");
    let (session, inbox) = broker.open_session(&config).await?;
    let rpc = RpcClient::with_session(session, inbox, config.service_queue);

    let res = rpc
        .call_with_timeout(&Command::ping(), Duration::from_millis(100))
        .await;

    assert!(matches!(res, Err(Error::Timeout)));

    // The pending entry was abandoned with the timeout.
    assert_eq!(rpc.outstanding_calls(), 0);

    let ping = Command::ping();
    let late = rpc.call_with_timeout(&ping, Duration::from_millis(50));
    assert!(late.await.is_err());

    rpc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_close_fails_pending_calls() -> Result<()> {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let config = RpcConfig::memory("lazy-service");
    let (session, inbox) = broker.open_session(&config).await?;
    let rpc = RpcClient::with_session(session, inbox, config.service_queue);

    let pending = {
        let rpc = rpc.clone();
        tokio::spawn(async move { rpc.call(&Command::ping()).await })
    };

    // Let the call register and publish before tearing the session down.
    tokio::time::sleep(Duration::from_millis(50)).await;
    rpc.close().await?;

    let res = pending.await.unwrap();
    assert!(matches!(res, Err(Error::ReplyChannelClosed)));
    Ok(())
}

#[tokio::test]
async fn test_close_after_resolved_call_and_double_close() -> Result<()> {
    // ---
    init_logging();

    let service = MusicbrainzService::start().await?;
    let client = service.client().await?;

    let reply = client.ping().await?;
    assert!(reply.is_empty());

    // Close twice; neither may fail or panic.
    client.close().await?;
    client.close().await?;

    service.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_decode_error_surfaces_to_caller() -> Result<()> {
    // ---
    init_logging();

    // A service that answers every command with garbage.
    let broker = MemoryBroker::new();
    let mut requests = broker.declare("garbage-service").await?;

    let responder = broker.clone();
    let handle = tokio::spawn(async move {
        // ---
        while let Some(delivery) = requests.recv().await {
            let Some(reply_to) = delivery.reply_to.clone() else {
                continue;
            };
            responder
                .publish(
                    &reply_to,
                    MemoryDelivery {
                        reply_to: None,
                        correlation_id: delivery.correlation_id.clone(),
                        payload: Bytes::from("not json"),
                    },
                )
                .await;
        }
    });

    let config = RpcConfig::memory("garbage-service");
    let (session, inbox) = broker.open_session(&config).await?;
    let client = ServiceClient::new(RpcClient::with_session(
        session,
        inbox,
        config.service_queue,
    ));

    let res = client.info().await;
    assert!(matches!(res, Err(Error::Decode(_))));

    client.close().await?;
    handle.abort();
    Ok(())
}
