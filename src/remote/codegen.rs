//! Client code snippets equivalent to an HTTP request description.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::{Value as Json, json};
use url::form_urlencoded;

use super::{HttpRequestSpec, OutputMode, RemoteError};

/// The service's answer to a code-generation request.
pub fn template_response(spec: &HttpRequestSpec) -> Result<Json, RemoteError> {
    let template = generate(spec.output_mode, spec)?;
    let format = serde_json::to_value(spec.output_mode).unwrap_or(Json::Null);
    Ok(json!({
        "success": true,
        "mode": "template",
        "format": format,
        "template": template,
        "originalConfig": {
            "url": spec.url,
            "method": spec.method_upper(),
            "headers": spec.headers,
            "query": spec.merged_query(),
            "body": spec.body,
            "timeout": spec.timeout,
        },
    }))
}

pub fn generate(mode: OutputMode, spec: &HttpRequestSpec) -> Result<String, RemoteError> {
    if !spec.method_is_valid() {
        return Err(RemoteError::InvalidRequest(format!(
            "invalid HTTP method '{}'",
            spec.method.trim()
        )));
    }
    match mode {
        OutputMode::Execute => Err(RemoteError::InvalidRequest(
            "execute is not a template format".into(),
        )),
        OutputMode::Curl => Ok(curl(spec)),
        OutputMode::Powershell => Ok(powershell(spec)),
        OutputMode::Python => Ok(python(spec)),
        OutputMode::Javascript => Ok(javascript(spec)),
        OutputMode::Java => Ok(java(spec)),
    }
}

/// POSIX shell single-quoted literal.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

/// PowerShell single-quoted literal.
pub fn powershell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub fn json_quote(s: &str) -> String {
    Json::String(s.to_string()).to_string()
}

fn full_url(spec: &HttpRequestSpec) -> String {
    let query = spec.merged_query();
    if query.is_empty() {
        return spec.url.clone();
    }
    let qs = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter())
        .finish();
    let sep = if spec.url.contains('?') { '&' } else { '?' };
    format!("{}{sep}{qs}", spec.url)
}

fn pretty(value: &impl Serialize, indent: &[u8]) -> String {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent));
    if value.serialize(&mut ser).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// Body as text: strings verbatim, anything else as indented JSON.
fn body_text(body: &Json, indent: Option<&[u8]>) -> String {
    match (body, indent) {
        (Json::String(s), _) => s.clone(),
        (other, Some(indent)) => pretty(other, indent),
        (other, None) => other.to_string(),
    }
}

fn content_type_is_json(headers: &BTreeMap<String, String>) -> bool {
    headers
        .get("Content-Type")
        .is_some_and(|v| v.contains("json"))
}

fn curl(spec: &HttpRequestSpec) -> String {
    let method = spec.method_upper();
    let mut cmd = String::from("curl");
    if method != "GET" {
        let _ = write!(cmd, " -X {method}");
    }
    let _ = write!(cmd, " {}", shell_quote(&full_url(spec)));
    for (k, v) in &spec.headers {
        let _ = write!(cmd, " \\\n  -H {}", shell_quote(&format!("{k}: {v}")));
    }
    if spec.has_body() {
        let _ = write!(cmd, " \\\n  -d {}", shell_quote(&body_text(&spec.body, Some(b"  ".as_slice()))));
    }
    format!("# Generated cURL command\n{cmd}")
}

fn powershell(spec: &HttpRequestSpec) -> String {
    let method = spec.method_upper();
    let mut s = String::from("# Generated PowerShell script\n\n");
    let _ = writeln!(s, "$uri = {}", powershell_quote(&full_url(spec)));
    let _ = writeln!(s, "$method = {}", powershell_quote(&method));
    if !spec.headers.is_empty() {
        s.push_str("$headers = @{\n");
        for (k, v) in &spec.headers {
            let _ = writeln!(s, "    {} = {}", powershell_quote(k), powershell_quote(v));
        }
        s.push_str("}\n");
    }
    if spec.has_body() {
        let _ = writeln!(s, "$body = {}", powershell_quote(&body_text(&spec.body, Some(b"  ".as_slice()))));
    }
    s.push_str("\n$response = Invoke-RestMethod -Uri $uri -Method $method");
    if !spec.headers.is_empty() {
        s.push_str(" -Headers $headers");
    }
    if spec.has_body() {
        s.push_str(" -Body $body");
        if content_type_is_json(&spec.headers) {
            s.push_str(" -ContentType \"application/json\"");
        }
    }
    s.push_str("\n\n# Display response\n$response | ConvertTo-Json -Depth 10");
    s
}

fn python(spec: &HttpRequestSpec) -> String {
    let method = spec.method_upper();
    let query = spec.merged_query();
    let mut s = String::from("# Generated Python requests code\nimport requests\nimport json\n\n");
    let _ = writeln!(s, "url = {}", json_quote(&spec.url));
    if !query.is_empty() {
        let _ = writeln!(s, "params = {}", pretty(&query, b"  "));
    }
    if !spec.headers.is_empty() {
        let _ = writeln!(s, "headers = {}", pretty(&spec.headers, b"  "));
    }
    if spec.has_body() {
        match &spec.body {
            Json::String(text) => {
                let _ = writeln!(s, "data = {}", json_quote(text));
            }
            other => {
                let _ = writeln!(s, "data = {}", pretty(other, b"  "));
            }
        }
    }
    match method.as_str() {
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" | "HEAD" | "OPTIONS" => {
            let _ = write!(s, "\nresponse = requests.{}(url", method.to_ascii_lowercase());
        }
        other => {
            let _ = write!(s, "\nresponse = requests.request({}, url", json_quote(other));
        }
    }
    if !query.is_empty() {
        s.push_str(", params=params");
    }
    if !spec.headers.is_empty() {
        s.push_str(", headers=headers");
    }
    if spec.has_body() {
        s.push_str(if content_type_is_json(&spec.headers) {
            ", json=data"
        } else {
            ", data=data"
        });
    }
    if spec.timeout > 0 {
        // requests takes seconds
        let secs = spec.timeout as f64 / 1000.0;
        let _ = write!(s, ", timeout={secs}");
    }
    s.push_str(")\n\n# Handle response\n");
    s.push_str("print(f\"Status Code: {response.status_code}\")\n");
    s.push_str("print(f\"Response: {response.text}\")");
    s
}

fn javascript(spec: &HttpRequestSpec) -> String {
    let method = spec.method_upper();
    let mut s = String::from("// Generated JavaScript fetch code\n\nasync function makeRequest() {\n");
    let _ = writeln!(s, "  const url = {};\n", json_quote(&full_url(spec)));
    s.push_str("  const options = {\n");
    let _ = writeln!(s, "    method: {},", json_quote(&method));
    if !spec.headers.is_empty() {
        let _ = writeln!(s, "    headers: {},", pretty(&spec.headers, b"      "));
    }
    if spec.has_body() {
        let _ = writeln!(s, "    body: {}", json_quote(&body_text(&spec.body, None)));
    }
    s.push_str("  };\n\n");
    s.push_str(concat!(
        "  try {\n",
        "    const response = await fetch(url, options);\n",
        "    const data = await response.json();\n",
        "\n",
        "    console.log(\"Status:\", response.status);\n",
        "    console.log(\"Response:\", data);\n",
        "\n",
        "    return data;\n",
        "  } catch (error) {\n",
        "    console.error(\"Request failed:\", error);\n",
        "    throw error;\n",
        "  }\n",
        "}\n\n",
        "// Execute request\n",
        "makeRequest();",
    ));
    s
}

fn java(spec: &HttpRequestSpec) -> String {
    let method = spec.method_upper();
    let mut s = String::from(concat!(
        "// Generated Java OkHttp code\n",
        "import okhttp3.*;\n",
        "import java.io.IOException;\n\n",
        "public class HttpRequest {\n",
        "    public static void main(String[] args) throws IOException {\n",
        "        OkHttpClient client = new OkHttpClient();\n\n",
    ));
    let _ = writeln!(s, "        String url = {};\n", json_quote(&full_url(spec)));
    if spec.has_body() {
        let media = spec
            .headers
            .get("Content-Type")
            .map(String::as_str)
            .unwrap_or("application/json");
        let _ = writeln!(s, "        MediaType mediaType = MediaType.parse({});", json_quote(media));
        let _ = writeln!(
            s,
            "        RequestBody body = RequestBody.create(mediaType, {});\n",
            json_quote(&body_text(&spec.body, None))
        );
    }
    s.push_str("        Request.Builder requestBuilder = new Request.Builder()\n");
    s.push_str("                .url(url)");
    let body_arg = if spec.has_body() {
        "body"
    } else {
        "RequestBody.create(MediaType.parse(\"\"), \"\")"
    };
    match method.as_str() {
        "GET" => {}
        "POST" | "PUT" | "PATCH" | "DELETE" => {
            let _ = write!(s, "\n                .{}({body_arg})", method.to_ascii_lowercase());
        }
        other => {
            let _ = write!(s, "\n                .method({}, {body_arg})", json_quote(other));
        }
    }
    for (k, v) in &spec.headers {
        let _ = write!(s, "\n                .addHeader({}, {})", json_quote(k), json_quote(v));
    }
    s.push_str(concat!(
        ";\n\n",
        "        Request request = requestBuilder.build();\n\n",
        "        try (Response response = client.newCall(request).execute()) {\n",
        "            System.out.println(\"Status: \" + response.code());\n",
        "            System.out.println(\"Response: \" + response.body().string());\n",
        "        }\n",
        "    }\n",
        "}",
    ));
    s
}
