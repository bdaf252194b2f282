//! Snapshot tests
//!
//! Loads each *.conf file in /tests/ individually and compares if the
//! normalised dump changes.

#[test]
fn snapshots() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ROSE_CONF_LOG"))
        .with_writer(std::io::stderr)
        .init();

    insta::glob!("*.conf", |path| {
        let node = rose_conf::config::ConfigNode::load(path).expect("must be valid configuration");
        insta::assert_snapshot!(node.dump());
    });
}
