//! Routing artifact generator
//!
//! Deterministic string template: same config in, same source out. The
//! artifact's contents are opaque to the control plane; the edge platform
//! interprets them.

use edgelb_core::LoadBalancerConfig;

/// Render the routing artifact source for one load balancer config.
pub fn render_artifact(config: &LoadBalancerConfig) -> String {
    let hosts = config
        .hosts
        .iter()
        .map(|h| format!("\"{}\"", h))
        .collect::<Vec<_>>()
        .join(", ");

    let lines = [
        format!(
            "// edgelb routing artifact for \"{}\" (generated, do not edit)",
            config.name
        ),
        format!("const BACKENDS = [{}];", hosts),
        format!(
            "const PROBE_PATH = \"{}\";",
            config.health_check.probe_path
        ),
        "let cursor = 0;".to_string(),
        String::new(),
        "export default {".to_string(),
        "  async fetch(request) {".to_string(),
        "    if (BACKENDS.length === 0) {".to_string(),
        "      return new Response(\"no backends configured\", { status: 503 });".to_string(),
        "    }".to_string(),
        "    const backend = BACKENDS[cursor++ % BACKENDS.length];".to_string(),
        "    const url = new URL(request.url);".to_string(),
        "    url.host = backend;".to_string(),
        "    return fetch(new Request(url, request));".to_string(),
        "  }".to_string(),
        "};".to_string(),
    ];
    let mut source = lines.join("\n");
    source.push('\n');
    source
}
