//!
//! wastems CLI
//! -----------
//! Command-line front end for the administration API. Keeps the login session
//! in a local file so consecutive invocations share it, and routes every
//! resource call through the refreshing request pipeline.

use std::env;
use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use wastems::identity::{guard_route, Authenticator, FileStorage, GuardDecision, SessionStore};
use wastems::{ApiClient, ClientConfig};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--url <base_url>] [--session <file>] <command> [args]\n\nCommands:\n  login <email> [password]     exchange credentials; password read from stdin when omitted\n  logout                       drop the stored session\n  whoami                       show the stored user and role\n  get <path>                   GET /api<path>\n  delete <path>                DELETE /api<path>\n  post <path> [json]           POST /api<path> (body defaults to {{}})\n  put <path> [json]            PUT /api<path> (body defaults to {{}})\n  route <path>                 show what the route guards decide for a client route\n\nFlags:\n  --url <base_url>             backend base URL (env WASTEMS_API_URL, default http://127.0.0.1:5000)\n  --session <file>             session file (env WASTEMS_SESSION_FILE, default ./wastems-session.json)\n  -h, --help                   show this help\n\nExamples:\n  {program} login admin@wastems.com admin123\n  {program} get /bins?status=full\n  {program} post /complaints '{{\"category\":\"overflow\",\"binId\":\"B-17\"}}'\n  {program} route /admin/zones"
    );
}

fn parse_body(arg: Option<&String>) -> Result<Option<Value>> {
    match arg {
        None => Ok(None),
        Some(s) => Ok(Some(serde_json::from_str(s).with_context(|| format!("body is not valid JSON: {}", s))?)),
    }
}

fn read_password() -> Result<String> {
    eprint!("password: ");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);
    let mut config = ClientConfig::from_env();
    let mut rest: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--url" => {
                if i + 1 >= args.len() { eprintln!("--url requires a value"); print_usage(&program); std::process::exit(2); }
                config.base_url = args[i + 1].clone();
                i += 2; continue;
            }
            "--session" => {
                if i + 1 >= args.len() { eprintln!("--session requires a value"); print_usage(&program); std::process::exit(2); }
                config = config.with_session_file(args[i + 1].clone());
                i += 2; continue;
            }
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            other => { rest.push(other.to_string()); i += 1; }
        }
    }
    let Some((command, params)) = rest.split_first() else {
        print_usage(&program);
        std::process::exit(2);
    };

    let session_file = config.session_file_or_default();
    let storage = FileStorage::open(&session_file)
        .with_context(|| format!("cannot open session file {}", session_file.display()))?;
    let session = Arc::new(SessionStore::open(storage));
    let api = Arc::new(ApiClient::new(&config, session.clone())?);
    let auth = Authenticator::new(api.clone());
    info!(target: "wastems", "wastems: base_url='{}' session_file='{}'", api.base_url(), session_file.display());

    let out = match (command.as_str(), params) {
        ("login", [email]) => {
            let password = read_password()?;
            let user = auth.login(email, &password).await?;
            serde_json::to_value(&user)?
        }
        ("login", [email, password]) => {
            let user = auth.login(email, password).await?;
            serde_json::to_value(&user)?
        }
        ("logout", []) => {
            auth.logout();
            serde_json::json!({ "status": "logged_out" })
        }
        ("whoami", []) => match session.user() {
            Some(u) => serde_json::json!({ "user": u, "role": u.role.label() }),
            None => return Err(anyhow!("not logged in")),
        },
        ("get", [path]) => api.get(path).await?,
        ("delete", [path]) => api.delete(path).await?,
        ("post", [path, body @ ..]) if body.len() <= 1 => api.post(path, parse_body(body.first())?).await?,
        ("put", [path, body @ ..]) if body.len() <= 1 => api.put(path, parse_body(body.first())?).await?,
        ("route", [path]) => {
            let snap = session.snapshot();
            match guard_route(path, snap.user.as_ref(), snap.loading) {
                GuardDecision::Render => serde_json::json!({ "route": path, "decision": "render" }),
                GuardDecision::Wait => serde_json::json!({ "route": path, "decision": "wait" }),
                GuardDecision::Redirect(to) => serde_json::json!({ "route": path, "decision": "redirect", "to": to }),
            }
        }
        (cmd, _) => {
            eprintln!("Unrecognized command or arguments: {}", cmd);
            print_usage(&program);
            std::process::exit(2);
        }
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
