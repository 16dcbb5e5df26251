//! GIOP Echo Demo
//!
//! A greeter object served over IIOP, and a client that reaches it through a
//! stringified object reference.
//!
//! ```text
//!  client                                      server
//!  ------                                      ------
//!  "IOR:..." / "corbaloc:..."
//!     |  resolve: primary, then alternates
//!     v
//!  Request(greet, CDR string) ---------------> Greeter::dispatch
//!     [call context service context]            |
//!  <--------------------- Reply(CDR string) <---+
//! ```
//!
//! Operations:
//! - `greet`: CDR string in, CDR string out
//! - `whoami`: returns the `user` entry of the caller's call context
//! - `echo`: returns the raw body unchanged
//!
//! Usage:
//!   giop-echo demo
//!   giop-echo serve --port 2809 --alternate backup.example.com:2810
//!   giop-echo call "corbaloc::localhost:2809/Greeter" --name World --user alice

use async_trait::async_trait;
use bytes::Bytes;
use cdr::{CdrContext, CdrReader, CdrWriter};
use clap::{Parser, Subcommand, ValueEnum};
use giop::{
    CallContext, ConnectionManagerConfig, DispatchError, Endpoint, GiopServer, GiopVersion,
    IncomingRequest, PolicySet, RequestTimeoutPolicy, ServantDispatcher, SystemException,
};
use iiop::{
    AlternateIiopAddressComponentData, CodeSetComponentInfo, InternetIiopProfile, ObjectReference,
    OrbClient, PayloadMarshaler, RawMarshaler,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const GREETER_TYPE_ID: &str = "IDL:Demo/Greeter:1.0";
const GREETER_KEY: &[u8] = b"Greeter";

#[derive(Parser, Debug)]
#[command(name = "giop-echo")]
#[command(version)]
#[command(about = "Greeter server and client over GIOP/IIOP")]
struct Args {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a server and a client in one process
    Demo,

    /// Serve the greeter and print its object reference
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value_t = 2809)]
        port: u16,

        /// Extra address to advertise in the IOR, as host:port
        #[arg(long = "alternate", value_parser = parse_endpoint)]
        alternates: Vec<Endpoint>,
    },

    /// Invoke the greeter through an IOR string or corbaloc URL
    Call {
        /// `IOR:...` or `corbaloc:...`
        reference: String,

        #[arg(long, default_value = "World")]
        name: String,

        /// Sent to the server in the call context
        #[arg(long)]
        user: Option<String>,

        /// Per-call request timeout in milliseconds
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,

        #[arg(long, value_enum, default_value = "1.2")]
        giop: GiopVersionArg,

        /// Encode requests little-endian
        #[arg(long)]
        little_endian: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GiopVersionArg {
    #[value(name = "1.0")]
    V1_0,
    #[value(name = "1.1")]
    V1_1,
    #[value(name = "1.2")]
    V1_2,
}

impl From<GiopVersionArg> for GiopVersion {
    fn from(arg: GiopVersionArg) -> Self {
        match arg {
            GiopVersionArg::V1_0 => GiopVersion::V1_0,
            GiopVersionArg::V1_1 => GiopVersion::V1_1,
            GiopVersionArg::V1_2 => GiopVersion::V1_2,
        }
    }
}

fn parse_endpoint(s: &str) -> Result<Endpoint, String> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("expected host:port, got {:?}", s))?;
    let port = port
        .parse()
        .map_err(|e| format!("invalid port {:?}: {}", port, e))?;
    Ok(Endpoint::new(host.trim_start_matches('[').trim_end_matches(']'), port))
}

/// The greeter servant
struct Greeter;

#[async_trait]
impl ServantDispatcher for Greeter {
    async fn dispatch(&self, request: IncomingRequest) -> Result<Bytes, DispatchError> {
        let marshal = |_| DispatchError::System(SystemException::marshal());
        match request.operation.as_str() {
            "greet" => {
                let name: String = request.payload_reader().read().map_err(marshal)?;
                info!("greet({:?})", name);
                let mut writer = request.reply_writer();
                writer.write(&format!("Hello, {}!", name)).map_err(marshal)?;
                Ok(writer.into_bytes())
            }
            "whoami" => {
                let user = CallContext::current()
                    .and_then(|ctx| ctx.get("user").map(|e| e.value.clone()))
                    .unwrap_or_else(|| "anonymous".to_string());
                info!("whoami -> {}", user);
                let mut writer = request.reply_writer();
                writer.write(&user).map_err(marshal)?;
                Ok(writer.into_bytes())
            }
            "echo" => Ok(request.payload),
            other => {
                info!("unknown operation {:?}", other);
                Err(DispatchError::System(SystemException::bad_operation()))
            }
        }
    }

    async fn locate(&self, object_key: &[u8]) -> bool {
        object_key == GREETER_KEY
    }
}

/// Marshals the greeter's string operations
struct GreeterMarshaler;

impl PayloadMarshaler for GreeterMarshaler {
    type Args = str;
    type Output = String;

    fn encode_payload(&self, _operation: &str, args: &str, writer: &mut CdrWriter) -> iiop::Result<()> {
        writer.write(args)?;
        Ok(())
    }

    fn decode_payload(&self, _operation: &str, reader: &mut CdrReader) -> iiop::Result<String> {
        Ok(reader.read()?)
    }

    fn is_idempotent(&self, _operation: &str) -> bool {
        true
    }
}

fn greeter_reference(primary: &Endpoint, alternates: &[Endpoint]) -> iiop::Result<ObjectReference> {
    let mut profile = InternetIiopProfile::new(
        GiopVersion::V1_2,
        primary.host.clone(),
        primary.port,
        Bytes::from_static(GREETER_KEY),
    )
    .with_component(CodeSetComponentInfo::native().to_component(CdrContext::big_endian())?);
    for alt in alternates {
        profile = profile.with_component(
            AlternateIiopAddressComponentData::new(alt.host.clone(), alt.port)
                .to_component(CdrContext::big_endian())?,
        );
    }
    ObjectReference::from_iiop(GREETER_TYPE_ID, &profile)
}

async fn run_server(
    listener: TcpListener,
    shutdown: impl std::future::Future<Output = ()>,
) -> giop::Result<()> {
    let server = GiopServer::new(Greeter);
    server.run_listener(listener, shutdown).await?;
    info!("Server shut down");
    Ok(())
}

async fn run_client(
    reference: &str,
    name: &str,
    user: Option<String>,
    timeout: Duration,
    config: ConnectionManagerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = ObjectReference::parse(reference)?;
    info!(
        "Target {:?} with {} profile(s)",
        target.type_id(),
        target.profiles().len()
    );

    let client = OrbClient::builder().config(config).build();
    let policies = PolicySet::new().with(RequestTimeoutPolicy(timeout));
    let context = match user {
        Some(user) => CallContext::new().with("user", user),
        None => CallContext::new(),
    };

    context
        .scope(async {
            let greeting = client
                .invoke_with(&target, "greet", &GreeterMarshaler, name, &policies)
                .await?;
            println!("{}", greeting);

            let me = client
                .invoke_with(&target, "whoami", &GreeterMarshaler, "", &policies)
                .await?;
            println!("whoami: {}", me);

            let raw = client
                .invoke_with(&target, "echo", &RawMarshaler::new(), &b"raw bytes"[..], &policies)
                .await?;
            println!("echo: {} bytes", raw.len());
            Ok::<_, iiop::OrbError>(())
        })
        .await?;

    client.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Demo => {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            let addr: SocketAddr = listener.local_addr()?;
            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
            let server_handle = tokio::spawn(run_server(listener, async move {
                let _ = shutdown_rx.await;
            }));

            let ior = greeter_reference(&Endpoint::new(addr.ip().to_string(), addr.port()), &[])?;
            info!("Greeter at {}", ior);

            let result = run_client(
                &ior.to_string(),
                "World",
                Some("demo".to_string()),
                Duration::from_secs(5),
                ConnectionManagerConfig::default(),
            )
            .await;

            let _ = shutdown_tx.send(());
            let _ = server_handle.await;
            result
        }
        Command::Serve {
            host,
            port,
            alternates,
        } => {
            let listener = TcpListener::bind((host.as_str(), port)).await?;
            let local = listener.local_addr()?;
            let ior = greeter_reference(&Endpoint::new(host, local.port()), &alternates)?;
            println!("{}", ior);
            println!("corbaloc::{}:{}/Greeter", local.ip(), local.port());

            run_server(listener, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
            Ok(())
        }
        Command::Call {
            reference,
            name,
            user,
            timeout_ms,
            giop,
            little_endian,
        } => {
            let config = ConnectionManagerConfig {
                giop_version: giop.into(),
                byte_order: if little_endian {
                    CdrContext::little_endian()
                } else {
                    CdrContext::big_endian()
                },
                ..Default::default()
            };
            run_client(
                &reference,
                &name,
                user,
                Duration::from_millis(timeout_ms),
                config,
            )
            .await
        }
    }
}
