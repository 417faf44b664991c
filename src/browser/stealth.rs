//! Automation evasions installed on every new document
//!
//! Launch arguments hide the obvious automation switches; the rest of the
//! fingerprint (webdriver flag, plugins, languages, WebGL strings) has to be
//! patched from inside the page before the application's own scripts run.

use anyhow::Result;
use chromiumoxide::{Page, cdp};
use serde_json::Value;
use tracing::debug;

/// Browser fingerprint presented to the application
#[derive(Debug, Clone)]
pub struct StealthProfile {
    pub accept_language: String,
    pub platform: String,
    pub languages: Vec<String>,
    pub hardware_concurrency: u32,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
}

impl Default for StealthProfile {
    fn default() -> Self {
        Self {
            accept_language: "en-US,en;q=0.9".to_string(),
            platform: "Win32".to_string(),
            languages: vec!["en-US".to_string(), "en".to_string()],
            hardware_concurrency: 8,
            webgl_vendor: "Intel Inc.".to_string(),
            webgl_renderer: "Intel Iris OpenGL Engine".to_string(),
        }
    }
}

impl StealthProfile {
    /// One script carrying every evasion, parameterised by this profile
    pub fn script(&self) -> String {
        let languages = Value::from(self.languages.clone());
        format!(
            r#"
((profile) => {{
    const define = (target, key, value) => {{
        try {{
            Object.defineProperty(target, key, {{ get: () => value, configurable: true }});
        }} catch (e) {{}}
    }};

    define(Navigator.prototype, 'webdriver', false);
    define(Navigator.prototype, 'languages', Object.freeze(profile.languages.slice()));
    define(Navigator.prototype, 'language', profile.languages[0]);
    define(Navigator.prototype, 'platform', profile.platform);
    define(Navigator.prototype, 'hardwareConcurrency', profile.hardwareConcurrency);

    const mockPlugins = [
        {{ name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }},
        {{ name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' }},
        {{ name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }}
    ];
    const plugins = {{}};
    mockPlugins.forEach((plugin, i) => {{
        plugins[i] = plugin;
        plugins[plugin.name] = plugin;
    }});
    Object.defineProperty(plugins, 'length', {{ value: mockPlugins.length }});
    plugins.item = (i) => mockPlugins[i] || null;
    plugins.namedItem = (name) => mockPlugins.find((p) => p.name === name) || null;
    define(Navigator.prototype, 'plugins', plugins);

    if (!window.chrome) {{
        window.chrome = {{}};
    }}
    if (!window.chrome.runtime) {{
        window.chrome.runtime = {{
            connect: () => ({{
                onMessage: {{ addListener: () => {{}}, removeListener: () => {{}} }},
                postMessage: () => {{}}
            }})
        }};
    }}

    if (navigator.permissions && navigator.permissions.query) {{
        const query = navigator.permissions.query.bind(navigator.permissions);
        navigator.permissions.query = (parameters) =>
            parameters && parameters.name === 'notifications'
                ? Promise.resolve({{ state: Notification.permission }})
                : query(parameters);
    }}

    const patchWebGl = (proto) => {{
        if (!proto) return;
        const getParameter = proto.getParameter;
        proto.getParameter = new Proxy(getParameter, {{
            apply(target, ctx, args) {{
                const param = (args && args[0]) || null;
                if (param === 37445) return profile.webglVendor;
                if (param === 37446) return profile.webglRenderer;
                return Reflect.apply(target, ctx, args);
            }}
        }});
    }};
    patchWebGl(window.WebGLRenderingContext && WebGLRenderingContext.prototype);
    patchWebGl(window.WebGL2RenderingContext && WebGL2RenderingContext.prototype);
}})({{
    languages: {languages},
    platform: {platform},
    hardwareConcurrency: {cores},
    webglVendor: {vendor},
    webglRenderer: {renderer}
}})
"#,
            platform = Value::from(self.platform.as_str()),
            cores = self.hardware_concurrency,
            vendor = Value::from(self.webgl_vendor.as_str()),
            renderer = Value::from(self.webgl_renderer.as_str()),
        )
    }
}

/// Register the evasions for every document `page` loads and drop
/// "Headless" from its user agent
pub async fn inject(page: &Page, profile: &StealthProfile) -> Result<()> {
    debug!("Injecting stealth evasions");
    page.execute(
        cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams {
            source: profile.script(),
            include_command_line_api: None,
            world_name: None,
            run_immediately: None,
        },
    )
    .await?;

    let version = page
        .execute(cdp::browser_protocol::browser::GetVersionParams {})
        .await?;
    let user_agent = version.user_agent.replace("Headless", "");

    page.execute(cdp::browser_protocol::network::SetUserAgentOverrideParams {
        user_agent,
        accept_language: Some(profile.accept_language.clone()),
        platform: Some(profile.platform.clone()),
        user_agent_metadata: None,
    })
    .await?;

    debug!("Stealth evasions registered");
    Ok(())
}
