// Line-delimited JSON-RPC tool server used by the integration tests.
//
// Behaviour is driven by flags:
//   --name NAME                server name reported in results (default "fake")
//   --tools a,b                tools to expose
//   --prompts a,b              prompts to expose
//   --resources uri,uri        resources to expose
//   --instructions TEXT        handshake instructions
//   --fail-tool NAME           answer calls to NAME with a JSON-RPC error
//   --error-tool NAME          answer calls to NAME with an isError result
//   --slow-tool NAME:MILLIS    sleep before answering calls to NAME
//   --exit-on-call NAME        exit without answering when NAME is called
//   --hang-init                never answer `initialize`
//   --ignore-ping              never answer `ping`
//   --page-size N              paginate tools/list
//   --announce-tool NAME       after the first tools/call, add NAME and send list_changed
//   --ask-roots                request roots/list after the handshake; tool `show_roots` returns them

use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Options {
    name: String,
    tools: Vec<String>,
    prompts: Vec<String>,
    resources: Vec<String>,
    instructions: Option<String>,
    fail_tool: Option<String>,
    error_tool: Option<String>,
    slow_tools: HashMap<String, u64>,
    exit_on_call: Option<String>,
    hang_init: bool,
    ignore_ping: bool,
    page_size: Option<usize>,
    announce_tool: Option<String>,
    ask_roots: bool,
}

fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_args() -> Options {
    let mut options = Options {
        name: "fake".to_string(),
        ..Options::default()
    };
    let mut args = std::env::args().skip(1);
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--name" => options.name = args.next().unwrap_or_default(),
            "--tools" => options.tools = list(args.next()),
            "--prompts" => options.prompts = list(args.next()),
            "--resources" => options.resources = list(args.next()),
            "--instructions" => options.instructions = args.next(),
            "--fail-tool" => options.fail_tool = args.next(),
            "--error-tool" => options.error_tool = args.next(),
            "--slow-tool" => {
                if let Some((name, millis)) = args.next().as_deref().and_then(|v| v.split_once(':')) {
                    options
                        .slow_tools
                        .insert(name.to_string(), millis.parse().unwrap_or(1000));
                }
            }
            "--exit-on-call" => options.exit_on_call = args.next(),
            "--hang-init" => options.hang_init = true,
            "--ignore-ping" => options.ignore_ping = true,
            "--page-size" => options.page_size = args.next().and_then(|v| v.parse().ok()),
            "--announce-tool" => options.announce_tool = args.next(),
            "--ask-roots" => options.ask_roots = true,
            other => eprintln!("fake-tool-server: ignoring unknown flag {other}"),
        }
    }
    options
}

fn send(out: &mut impl Write, message: &Value) {
    let _ = writeln!(out, "{message}");
    let _ = out.flush();
}

fn reply(out: &mut impl Write, id: &Value, result: Value) {
    send(out, &json!({ "jsonrpc": "2.0", "id": id, "result": result }));
}

fn reply_error(out: &mut impl Write, id: &Value, code: i64, message: &str) {
    send(
        out,
        &json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } }),
    );
}

fn tools_page(options: &Options, cursor: Option<&str>) -> Value {
    let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
    let size = options.page_size.unwrap_or(usize::MAX);
    let page: Vec<Value> = options
        .tools
        .iter()
        .skip(start)
        .take(size)
        .map(|name| {
            json!({
                "name": name,
                "description": format!("{name} from {}", options.name),
                "inputSchema": { "type": "object" }
            })
        })
        .collect();
    let next = start.saturating_add(size);
    if next < options.tools.len() {
        json!({ "tools": page, "nextCursor": next.to_string() })
    } else {
        json!({ "tools": page })
    }
}

fn main() {
    let mut options = parse_args();
    let stdin = io::stdin();
    let mut out = io::stdout();
    let mut roots = Value::Null;
    let mut announced = false;

    // ANSI noise before the first message must be tolerated by the client
    let _ = writeln!(out, "\u{1b}[32mfake-tool-server starting\u{1b}[0m");
    let _ = out.flush();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        let id = message.get("id").cloned();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        let Some(id) = id else {
            if method == "notifications/initialized" && options.ask_roots {
                send(
                    &mut out,
                    &json!({ "jsonrpc": "2.0", "id": "srv-roots", "method": "roots/list" }),
                );
            }
            continue;
        };
        if method.is_empty() {
            // a response to one of our own requests
            if id == json!("srv-roots") {
                roots = message.get("result").cloned().unwrap_or(Value::Null);
            }
            continue;
        }

        match method {
            "initialize" => {
                if options.hang_init {
                    continue;
                }
                let mut capabilities = json!({});
                if !options.tools.is_empty() || options.announce_tool.is_some() || options.ask_roots {
                    capabilities["tools"] = json!({ "listChanged": true });
                }
                if !options.prompts.is_empty() {
                    capabilities["prompts"] = json!({});
                }
                if !options.resources.is_empty() {
                    capabilities["resources"] = json!({});
                }
                let mut result = json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": capabilities,
                    "serverInfo": { "name": options.name, "version": "0.0.1" }
                });
                if let Some(text) = &options.instructions {
                    result["instructions"] = json!(text);
                }
                reply(&mut out, &id, result);
            }
            "ping" if options.ignore_ping => {}
            "ping" => reply(&mut out, &id, json!({})),
            "tools/list" => {
                let cursor = params.get("cursor").and_then(Value::as_str);
                let mut page = tools_page(&options, cursor);
                if options.ask_roots && cursor.is_none() {
                    if let Some(tools) = page["tools"].as_array_mut() {
                        tools.push(json!({ "name": "show_roots", "inputSchema": { "type": "object" } }));
                    }
                }
                reply(&mut out, &id, page);
            }
            "tools/call" => {
                let tool = params.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                if options.exit_on_call.as_deref() == Some(tool.as_str()) {
                    std::process::exit(0);
                }
                if let Some(millis) = options.slow_tools.get(&tool) {
                    thread::sleep(Duration::from_millis(*millis));
                }
                if options.fail_tool.as_deref() == Some(tool.as_str()) {
                    reply_error(&mut out, &id, -32000, &format!("{tool} exploded"));
                } else if options.error_tool.as_deref() == Some(tool.as_str()) {
                    reply(
                        &mut out,
                        &id,
                        json!({ "content": [{ "type": "text", "text": format!("{tool} refused") }], "isError": true }),
                    );
                } else if tool == "show_roots" {
                    reply(
                        &mut out,
                        &id,
                        json!({ "content": [{ "type": "text", "text": roots.to_string() }] }),
                    );
                } else if options.tools.contains(&tool) {
                    reply(
                        &mut out,
                        &id,
                        json!({ "content": [{ "type": "text", "text": format!("{}:{tool}:{arguments}", options.name) }] }),
                    );
                } else {
                    reply_error(&mut out, &id, -32602, &format!("unknown tool {tool}"));
                }

                if !announced {
                    if let Some(extra) = options.announce_tool.clone() {
                        announced = true;
                        options.tools.push(extra);
                        send(
                            &mut out,
                            &json!({ "jsonrpc": "2.0", "method": "notifications/tools/list_changed" }),
                        );
                    }
                }
            }
            "prompts/list" => {
                let prompts: Vec<Value> = options
                    .prompts
                    .iter()
                    .map(|name| json!({ "name": name, "arguments": [{ "name": "topic", "required": false }] }))
                    .collect();
                reply(&mut out, &id, json!({ "prompts": prompts }));
            }
            "prompts/get" => {
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                let topic = params
                    .pointer("/arguments/topic")
                    .and_then(Value::as_str)
                    .unwrap_or("anything");
                reply(
                    &mut out,
                    &id,
                    json!({ "messages": [{ "role": "user", "content": { "type": "text", "text": format!("{name} about {topic}") } }] }),
                );
            }
            "resources/list" => {
                let resources: Vec<Value> = options
                    .resources
                    .iter()
                    .map(|uri| {
                        let name = uri.rsplit('/').next().unwrap_or(uri);
                        json!({ "uri": uri, "name": name, "mimeType": "text/plain" })
                    })
                    .collect();
                reply(&mut out, &id, json!({ "resources": resources }));
            }
            "resources/read" => {
                let uri = params.get("uri").and_then(Value::as_str).unwrap_or_default();
                reply(
                    &mut out,
                    &id,
                    json!({ "contents": [{ "uri": uri, "mimeType": "text/plain", "text": format!("contents of {uri}") }] }),
                );
            }
            other => reply_error(&mut out, &id, -32601, &format!("method {other} not found")),
        }
    }
}
