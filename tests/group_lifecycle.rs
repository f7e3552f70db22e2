//! Group and container lifecycle against an in-process engine.
//!
//! These run without a docker daemon: every engine call lands in a
//! `FakeEngine`, and the assertions read back the recorded call sequence.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use docker_testsuite::testing::{EngineCall, FakeEngine, init_test_tracing};
use docker_testsuite::{
    Application, AwaitOutputHook, Container, ContainerSpec, Context, DirectPortAllocator,
    Environment, Error, FixtureConfig, Group, Matcher, PortBindings, PortSpec, Protocol,
    RandomPortAllocator,
};

fn container(engine: &Arc<FakeEngine>, name: &str, ports: PortBindings) -> Container {
    let spec = ContainerSpec::new(name, format!("example/{name}:1.0"), ports);
    Container::with_engine(engine.clone(), FixtureConfig::default(), spec)
}

fn random_ports() -> PortBindings {
    PortBindings::with_allocator(RandomPortAllocator::new("127.0.0.1"), "127.0.0.1")
}

// ── Teardown order ─────────────────────────────────────────────────────────

#[tokio::test]
async fn group_closes_in_reverse_and_removes_network_last() {
    init_test_tracing();

    let engine = Arc::new(FakeEngine::new());
    let apps = vec![
        Application::new(container(&engine, "a", random_ports())),
        Application::new(container(&engine, "b", random_ports())),
    ];
    let mut group = Group::with_engine(engine.clone(), "pair", apps);
    let ctx = Context::background();

    group.run(&ctx).await.unwrap();
    group.close(&ctx).await.unwrap();

    // container-1 is `a`, container-2 is `b`.
    let removals: Vec<String> = engine
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            EngineCall::RemoveContainer { id } => Some(id),
            EngineCall::RemoveNetwork { id } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(removals, vec!["container-2", "container-1", "network-1"]);

    let ops = engine.ops();
    assert_eq!(ops.first(), Some(&"create_network"));
    assert_eq!(ops.last(), Some(&"remove_network"));
}

#[tokio::test]
async fn group_members_join_network_under_their_names() {
    let engine = Arc::new(FakeEngine::new());
    let apps = vec![
        Application::new(container(&engine, "zookeeper", random_ports())),
        Application::new(container(&engine, "kafka", random_ports())),
    ];
    let mut group = Group::with_engine(engine.clone(), "kafka", apps);

    group.run(&Context::background()).await.unwrap();

    let aliases: Vec<(String, Vec<String>)> = engine
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            EngineCall::ConnectNetwork {
                container_id,
                aliases,
                ..
            } => Some((container_id, aliases)),
            _ => None,
        })
        .collect();
    assert_eq!(
        aliases,
        vec![
            ("container-1".to_string(), vec!["zookeeper".to_string()]),
            ("container-2".to_string(), vec!["kafka".to_string()]),
        ]
    );
    assert!(group.name().starts_with("kafka-"));
}

#[tokio::test(start_paused = true)]
async fn group_run_failure_leaves_cleanup_to_caller() {
    let engine = Arc::new(FakeEngine::new().with_logs(["starting"]).hold_logs_open());
    let apps = vec![
        Application::new(container(&engine, "a", random_ports()))
            .with_hook(AwaitOutputHook::new(Matcher::substring("ready"))),
        Application::new(container(&engine, "b", random_ports())),
    ];
    let mut group = Group::with_engine(engine.clone(), "broken", apps);

    let err = group
        .run(&Context::with_timeout(Duration::from_secs(10)))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("after_run"), "{err}");
    assert!(Error::from(err).is_cancelled());

    // `b` never ran, so its close fails first and teardown stops there.
    assert!(group.close(&Context::background()).await.is_err());
    assert!(!engine.ops().contains(&"remove_network"));
}

#[tokio::test]
async fn await_output_hook_passes_when_member_exits() {
    // A one-shot member prints and exits before the awaited line appears.
    let engine = Arc::new(FakeEngine::new().with_logs(["migrations applied"]));
    let apps = vec![
        Application::new(container(&engine, "migrate", random_ports()))
            .with_hook(AwaitOutputHook::new(Matcher::substring("listening"))),
        Application::new(container(&engine, "api", random_ports())),
    ];
    let mut group = Group::with_engine(engine.clone(), "oneshot", apps);
    let ctx = Context::background();

    group.run(&ctx).await.unwrap();

    let created = engine
        .ops()
        .into_iter()
        .filter(|op| *op == "create_container")
        .count();
    assert_eq!(created, 2);
    group.close(&ctx).await.unwrap();
}

// ── Environment sees the allocated ports ───────────────────────────────────

#[tokio::test]
async fn advertised_listener_embeds_published_port() {
    let engine = Arc::new(FakeEngine::new());
    let ports = random_ports().port_dnat(Protocol::Tcp, 9092).unwrap();
    let env = Environment::new().var("ADVERTISED_LISTENER", |c| {
        Ok(format!(
            "PLAINTEXT://{}:{}",
            c.docker_host_ip()?,
            c.external_port(Protocol::Tcp, 9092)?
        ))
    });
    let spec = ContainerSpec::new("kafka", "example/kafka:1.0", ports).with_env(env);
    let mut kafka = Container::with_engine(engine.clone(), FixtureConfig::default(), spec);

    kafka.run(&Context::background()).await.unwrap();
    let published = kafka.url(Protocol::Tcp, 9092).unwrap().port;

    let env = engine
        .calls()
        .into_iter()
        .find_map(|call| match call {
            EngineCall::CreateContainer { env, .. } => Some(env),
            _ => None,
        })
        .unwrap();
    assert_eq!(env.len(), 1);
    assert!(env[0].ends_with(&format!(":{published}")), "{}", env[0]);
}

#[tokio::test]
async fn direct_ports_publish_the_listening_port() {
    let engine = Arc::new(FakeEngine::new());
    let ports = PortBindings::with_allocator(DirectPortAllocator::default(), "127.0.0.1")
        .port_dnat(Protocol::Tcp, 9093)
        .unwrap();

    let external = ports.external_port(PortSpec::tcp(9093)).unwrap();
    assert_eq!(
        ports.resolve(PortSpec::tcp(9093)).unwrap(),
        PortSpec::tcp(external)
    );

    let mut controller = container(&engine, "controller", ports);
    controller.run(&Context::background()).await.unwrap();

    let bindings = engine
        .calls()
        .into_iter()
        .find_map(|call| match call {
            EngineCall::CreateContainer { port_bindings, .. } => Some(port_bindings),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        bindings,
        vec![(format!("{external}/tcp"), external.to_string())]
    );
}
