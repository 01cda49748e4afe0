//! The single-page chat UI served at `/`.
//!
//! Plain HTML and script with no build step. It talks to the JSON API only;
//! notices returned by settings actions are shown as toasts.

use axum::response::Html;

const INDEX_HTML: &str = r##"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>chatrag</title>
  <style>
    *, *::before, *::after { box-sizing: border-box; margin: 0; padding: 0; }
    body {
      font-family: system-ui, -apple-system, sans-serif;
      background: #0f0f0f; color: #e0e0e0;
      display: grid; grid-template-columns: 1fr 340px; gap: 1rem;
      height: 100vh; padding: 1rem;
    }
    section, aside {
      border: 1px solid #333; border-radius: 12px; background: #1a1a1a;
      padding: 1rem; display: flex; flex-direction: column; min-height: 0;
    }
    aside { overflow-y: auto; gap: 0.75rem; }
    h1 { font-size: 1.2rem; margin-bottom: 0.5rem; }
    h2 { font-size: 0.85rem; color: #888; text-transform: uppercase; margin-top: 0.5rem; }
    #chat { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 0.5rem; padding: 0.5rem 0; }
    .msg { padding: 0.6rem 0.8rem; border-radius: 8px; white-space: pre-wrap; max-width: 90%; }
    .user { background: #2a2a3a; align-self: flex-end; }
    .bot { background: #222; align-self: flex-start; border: 1px solid #333; }
    textarea, input, select {
      width: 100%; background: #111; color: #e0e0e0;
      border: 1px solid #333; border-radius: 6px; padding: 0.4rem;
      font: inherit;
    }
    input[type=range] { padding: 0; }
    button {
      padding: 0.45rem 0.9rem; border-radius: 8px; border: 0;
      background: #2a2a3a; color: #c0c0e0; cursor: pointer; font: inherit;
    }
    button:hover { background: #3a3a5a; }
    button.danger { background: #4a2020; color: #f0c0c0; }
    .row { display: flex; gap: 0.5rem; align-items: center; flex-wrap: wrap; }
    .row > * { flex: 1; }
    label { font-size: 0.85rem; color: #aaa; display: block; }
    #toasts { position: fixed; right: 1rem; bottom: 1rem; display: flex; flex-direction: column; gap: 0.5rem; }
    .toast { padding: 0.6rem 0.9rem; border-radius: 8px; max-width: 420px; font-size: 0.9rem; }
    .toast.info { background: #1f3a4a; }
    .toast.warning { background: #4a3a1f; }
    #status { font-size: 0.8rem; color: #777; }
  </style>
</head>
<body>
  <section>
    <h1>chatrag</h1>
    <div id="status">connecting…</div>
    <div id="chat"></div>
    <textarea id="message" rows="3" placeholder="Ask about your documents…"></textarea>
    <div class="row" style="margin-top:0.5rem">
      <button id="send">Send</button>
      <button id="clear">Clear window</button>
      <button id="clear-mem">Clear window + memory</button>
    </div>
  </section>

  <aside>
    <h2>Documents</h2>
    <input type="file" id="files" multiple />
    <div class="row">
      <button id="upload">Upload</button>
      <button id="delete-db" class="danger">Clear database</button>
    </div>

    <h2>Model</h2>
    <div id="providers" class="row"></div>
    <label>Model <select id="model"></select></label>

    <h2>Generation</h2>
    <label>Temperature <span id="temperature-v"></span>
      <input type="range" id="temperature" min="0.1" max="1" step="0.05" /></label>
    <label>Max tokens <span id="max_tokens-v"></span>
      <input type="range" id="max_tokens" min="100" max="5000" step="50" /></label>
    <label>Top-p <span id="top_p-v"></span>
      <input type="range" id="top_p" min="0.05" max="1" step="0.05" /></label>
    <label>Context window <input type="number" id="context_window" min="512" max="131072" step="512" /></label>
    <label>Quantization
      <select id="quantization">
        <option>None</option><option>8-bit</option><option>4-bit</option>
      </select></label>
    <label>Custom prompt <textarea id="custom_prompt" rows="4"></textarea></label>
    <button id="save-prompt">Apply prompt</button>

    <h2>GitHub repository</h2>
    <label>Owner <input id="gh-owner" /></label>
    <label>Repository <input id="gh-repo" /></label>
    <label>Branch <input id="gh-branch" /></label>
    <button id="save-github">Load repository</button>
  </aside>

  <div id="toasts"></div>

<script>
const $ = (id) => document.getElementById(id);

function toast(notice) {
  const el = document.createElement("div");
  el.className = "toast " + (notice.level || "info");
  el.textContent = notice.message;
  $("toasts").appendChild(el);
  setTimeout(() => el.remove(), (notice.duration_secs || 5) * 1000);
}

async function api(method, path, body) {
  const opts = { method, headers: {} };
  if (body instanceof FormData) {
    opts.body = body;
  } else if (body !== undefined) {
    opts.headers["Content-Type"] = "application/json";
    opts.body = JSON.stringify(body);
  }
  const resp = await fetch(path, opts);
  const data = await resp.json().catch(() => ({}));
  if (!resp.ok) {
    toast({ level: "warning", message: data.message || resp.statusText, duration_secs: 8 });
    throw new Error(data.message || resp.statusText);
  }
  (data.notices || []).forEach(toast);
  return data;
}

function render(history) {
  const chat = $("chat");
  chat.innerHTML = "";
  for (const [user, bot] of history) {
    for (const [cls, text] of [["user", user], ["bot", bot]]) {
      const el = document.createElement("div");
      el.className = "msg " + cls;
      el.textContent = text;
      chat.appendChild(el);
    }
  }
  chat.scrollTop = chat.scrollHeight;
}

async function refreshStatus() {
  try {
    const h = await api("GET", "/api/health");
    const idx = h.index ? `${h.index.documents} docs · ${h.index.chunks} chunks` : "index unavailable";
    $("status").textContent = `${h.provider} · ${h.model} · ${idx}`;
  } catch (_) { $("status").textContent = "offline"; }
}

async function loadModels(provider, selected) {
  const data = await api("GET", "/api/models?provider=" + encodeURIComponent(provider));
  const sel = $("model");
  sel.innerHTML = "";
  for (const name of data.models) {
    const opt = document.createElement("option");
    opt.textContent = name;
    opt.selected = name === (selected || data.default);
    sel.appendChild(opt);
  }
}

function showSettings(s) {
  for (const key of ["temperature", "max_tokens", "top_p"]) {
    $(key).value = s[key];
    $(key + "-v").textContent = s[key];
  }
  $("context_window").value = s.context_window;
  $("quantization").value = s.quantization;
  $("custom_prompt").value = s.custom_prompt;
  document.querySelectorAll("input[name=provider]").forEach((r) => { r.checked = r.value === s.provider; });
}

async function applySettings(patch) {
  const data = await api("PUT", "/api/settings", patch);
  showSettings(data.settings);
  render(data.history);
  await loadModels(data.settings.provider, data.settings.model);
  refreshStatus();
}

async function init() {
  const [{ providers }, { settings, github }, { history }] = await Promise.all([
    api("GET", "/api/providers"), api("GET", "/api/settings"), api("GET", "/api/history"),
  ]);
  for (const p of providers) {
    const label = document.createElement("label");
    const radio = document.createElement("input");
    radio.type = "radio"; radio.name = "provider"; radio.value = p.name; radio.style.width = "auto";
    radio.onchange = () => applySettings({ provider: p.name }).catch(() => {});
    label.append(radio, " " + p.name);
    $("providers").appendChild(label);
  }
  showSettings(settings);
  await loadModels(settings.provider, settings.model);
  $("gh-owner").value = github.owner; $("gh-repo").value = github.repo; $("gh-branch").value = github.branch;
  render(history);
  refreshStatus();
}

async function send() {
  const message = $("message").value.trim();
  if (!message) return;
  $("message").value = "";
  $("send").disabled = true;
  try {
    const resp = await fetch("/api/chat/stream", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify({ message }),
    });
    if (!resp.ok) {
      const data = await resp.json().catch(() => ({}));
      toast({ level: "warning", message: data.message || resp.statusText, duration_secs: 8 });
      return;
    }
    const base = Array.from(document.querySelectorAll(".msg")).length;
    let reply = "";
    const reader = resp.body.getReader();
    const decoder = new TextDecoder();
    let buf = "";
    for (;;) {
      const { value, done } = await reader.read();
      if (done) break;
      buf += decoder.decode(value, { stream: true });
      let cut;
      while ((cut = buf.indexOf("\n\n")) >= 0) {
        const block = buf.slice(0, cut);
        buf = buf.slice(cut + 2);
        let event = "message", data = "";
        for (const line of block.split("\n")) {
          if (line.startsWith("event:")) event = line.slice(6).trim();
          else if (line.startsWith("data:")) data += line.slice(5).replace(/^ /, "");
        }
        if (event === "delta") {
          reply += JSON.parse(data);
          const chat = $("chat");
          while (chat.children.length > base) chat.lastChild.remove();
          for (const [cls, text] of [["user", message], ["bot", reply]]) {
            const el = document.createElement("div");
            el.className = "msg " + cls; el.textContent = text; chat.appendChild(el);
          }
          chat.scrollTop = chat.scrollHeight;
        } else if (event === "done") {
          render(JSON.parse(data).history);
        } else if (event === "error") {
          toast({ level: "warning", message: data, duration_secs: 8 });
        }
      }
    }
  } finally {
    $("send").disabled = false;
  }
}

$("send").onclick = send;
$("message").addEventListener("keydown", (e) => {
  if (e.key === "Enter" && !e.shiftKey) { e.preventDefault(); send(); }
});
$("clear").onclick = async () => render((await api("DELETE", "/api/history")).history);
$("clear-mem").onclick = async () => render((await api("POST", "/api/memory/clear")).history);
$("model").onchange = () => applySettings({ model: $("model").value }).catch(() => {});
for (const key of ["temperature", "max_tokens", "top_p"]) {
  $(key).oninput = () => { $(key + "-v").textContent = $(key).value; };
  $(key).onchange = () => applySettings({ [key]: Number($(key).value) }).catch(() => {});
}
$("context_window").onchange = () => applySettings({ context_window: Number($("context_window").value) }).catch(() => {});
$("quantization").onchange = () => applySettings({ quantization: $("quantization").value }).catch(() => {});
$("save-prompt").onclick = () => applySettings({ custom_prompt: $("custom_prompt").value }).catch(() => {});
$("files").onchange = async () => {
  const form = new FormData();
  for (const f of $("files").files) form.append("files", f, f.name);
  if ([...form.keys()].length) await api("POST", "/api/files", form).catch(() => {});
};
$("upload").onclick = async () => {
  await api("POST", "/api/index/rebuild").catch(() => {});
  refreshStatus();
};
$("delete-db").onclick = async () => {
  await api("DELETE", "/api/index").catch(() => {});
  $("files").value = "";
  refreshStatus();
};
$("save-github").onclick = async () => {
  await api("PUT", "/api/github", {
    owner: $("gh-owner").value, repo: $("gh-repo").value, branch: $("gh-branch").value,
  }).catch(() => {});
  refreshStatus();
};

init().catch((e) => { $("status").textContent = "error: " + e.message; });
</script>
</body>
</html>
"##;

/// GET / — the chat UI.
pub(super) async fn root() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_wires_every_control() {
        for id in [
            "id=\"send\"", "id=\"clear\"", "id=\"clear-mem\"", "id=\"files\"", "id=\"upload\"",
            "id=\"delete-db\"", "id=\"providers\"", "id=\"model\"", "id=\"temperature\"",
            "id=\"max_tokens\"", "id=\"top_p\"", "id=\"context_window\"", "id=\"quantization\"",
            "id=\"custom_prompt\"", "id=\"gh-owner\"", "id=\"gh-repo\"", "id=\"gh-branch\"",
        ] {
            assert!(INDEX_HTML.contains(id), "missing control {id}");
        }
    }
}
