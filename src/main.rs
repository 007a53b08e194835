use std::sync::Arc;

use objectdfs::{
    abort_on_fatal, adapters, util, Behaviour, Config, Context, Dfs, FSError, ObjectFS,
};
use tracing::{error, info, span, Level};

fn check<T>(step: &str, res: Result<T, FSError>) -> T {
    match abort_on_fatal(res) {
        Ok(value) => value,
        Err(err) => {
            error!(error_message=%err, error_group=step);
            panic!("{} failed: {}", step, err);
        }
    }
}

fn new_client(provider: util::object::Provider, bucket: &str) -> Arc<dyn adapters::Object> {
    if provider.is_aws() {
        let config = util::poll::poll_until_ready(aws_config::load_from_env());
        Arc::new(aws_sdk_s3::Client::new(&config))
    } else {
        let config = check(
            "gcs_auth",
            util::poll::poll_until_ready(
                google_cloud_storage::client::ClientConfig::default().with_auth(),
            )
            .map_err(|err| FSError::Backend {
                operation: "authenticate",
                location: util::object::location(provider.scheme(), bucket, ""),
                message: err.to_string(),
            }),
        );
        Arc::new(google_cloud_storage::client::Client::new(config))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().json().init();

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();
    info!("called");

    let matches = clap::Command::new("objectdfs")
        .about("Smoke test a bucket through the object store filesystem adapter")
        .arg(clap::Arg::new("BUCKET").required(true).index(1))
        .arg(
            clap::Arg::new("behaviour")
                .long("behaviour")
                .default_value("fail-fast")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(clap::Arg::new("marker").long("marker").default_value("MARKER"))
        .arg(clap::Arg::new("renamed").long("renamed").default_value("NEWMARKER"))
        .get_matches();

    let bucket_uri = matches
        .get_one::<String>("BUCKET")
        .map(String::as_str)
        .unwrap_or_default();
    let behaviour = matches
        .get_one::<String>("behaviour")
        .map(String::as_str)
        .unwrap_or("fail-fast")
        .parse::<Behaviour>()
        .unwrap_or_else(|err| panic!("{}", err));
    let marker = matches
        .get_one::<String>("marker")
        .map(String::as_str)
        .unwrap_or("MARKER");
    let renamed = matches
        .get_one::<String>("renamed")
        .map(String::as_str)
        .unwrap_or("NEWMARKER");
    info!(bucket_uri = bucket_uri, behaviour = ?behaviour, "args");

    let provider = check("parse_provider", util::object::parse_provider_from_uri(bucket_uri));
    let bucket = check("parse_bucket", util::object::parse_bucket_from_uri(bucket_uri));

    let client = new_client(provider, bucket);
    if !check("bucket_exists", client.fs_bucket_exists(bucket)) {
        panic!("bucket {} does not exist", bucket_uri);
    }

    let fs = ObjectFS::new(client, bucket, Config::with_behaviour(behaviour));
    let ctx = Context::background();

    let stat = check("stat_fs", fs.stat_fs(&ctx));
    info!(name = %stat.name, "stat_fs");

    check("create_empty_file", fs.create_empty_file(&ctx, marker));
    info!(path = marker, "create_empty_file successful");

    check("rename", fs.rename(&ctx, marker, renamed));
    info!(old_path = marker, new_path = renamed, "rename successful");
}
