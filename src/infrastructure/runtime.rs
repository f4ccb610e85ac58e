use crate::core::models::ModuleId;
use std::collections::BTreeMap;

/// Global every chunk pushes `[names, factories]` onto
pub const CHUNK_QUEUE: &str = "__kilnChunks";
/// Global the runtime installs its `require` under
pub const RUNTIME_GLOBAL: &str = "__kilnRequire";

/// Module registry runtime carried by entry chunks. Installing it twice is a no-op.
pub fn runtime_source() -> String {
    format!(
        r#"(function () {{
  var root = typeof self !== "undefined" ? self : this;
  if (root.{global}) return;
  var factories = {{}};
  var cache = {{}};
  var loading = {{}};
  var hasOwn = Object.prototype.hasOwnProperty;
  function require(id) {{
    var cached = cache[id];
    if (cached) return cached.exports;
    var factory = factories[id];
    if (!factory) throw new Error("Cannot find module '" + id + "'");
    var module = cache[id] = {{ id: id, exports: {{}} }};
    factory.call(module.exports, module, module.exports, require);
    return module.exports;
  }}
  require.m = {{}};
  require.r = function (exports) {{
    if (typeof Symbol !== "undefined" && Symbol.toStringTag) {{
      Object.defineProperty(exports, Symbol.toStringTag, {{ value: "Module" }});
    }}
    Object.defineProperty(exports, "__esModule", {{ value: true }});
  }};
  require.d = function (exports, getters) {{
    for (var key in getters) {{
      if (hasOwn.call(getters, key) && !hasOwn.call(exports, key)) {{
        Object.defineProperty(exports, key, {{ enumerable: true, get: getters[key] }});
      }}
    }}
  }};
  require.n = function (mod) {{
    return mod && mod.__esModule ? mod["default"] : mod;
  }};
  require.x = function (exports, mod) {{
    Object.keys(mod).forEach(function (key) {{
      if (key !== "default" && !hasOwn.call(exports, key)) {{
        Object.defineProperty(exports, key, {{ enumerable: true, get: function () {{ return mod[key]; }} }});
      }}
    }});
  }};
  function load(url) {{
    if (loading[url]) return loading[url];
    return (loading[url] = new Promise(function (resolve, reject) {{
      var isStyle = /\.css(\?|$)/.test(url);
      var element = document.createElement(isStyle ? "link" : "script");
      if (isStyle) {{
        element.rel = "stylesheet";
        element.href = url;
      }} else {{
        element.src = url;
      }}
      element.onload = function () {{ resolve(); }};
      element.onerror = function () {{
        delete loading[url];
        reject(new Error("Loading chunk " + url + " failed"));
      }};
      document.head.appendChild(element);
    }}));
  }}
  require.e = function (id) {{
    var files = require.m[id] || [];
    return Promise.all(files.map(load)).then(function () {{
      return hasOwn.call(factories, id) ? require(id) : {{}};
    }});
  }};
  function install(chunk) {{
    var modules = chunk[1];
    for (var id in modules) {{
      if (hasOwn.call(modules, id)) factories[id] = modules[id];
    }}
  }}
  var queue = root.{queue} = root.{queue} || [];
  queue.forEach(install);
  var push = queue.push.bind(queue);
  queue.push = function (chunk) {{
    install(chunk);
    return push(chunk);
  }};
  root.{global} = require;
}})();
"#,
        global = RUNTIME_GLOBAL,
        queue = CHUNK_QUEUE
    )
}

/// Opening of a chunk's push call; module factories follow
pub fn chunk_header(names: &[&str]) -> String {
    let names = names
        .iter()
        .map(|n| quote(n))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "(self.{queue} = self.{queue} || []).push([[{names}], {{\n",
        queue = CHUNK_QUEUE,
        names = names
    )
}

pub const CHUNK_FOOTER: &str = "}]);\n";

/// One registry entry: `"id": function (module, exports, require) { body }`
pub fn module_factory(id: &str, body: &str) -> String {
    format!(
        "{}: function (module, exports, require) {{\n{}\n}},\n",
        quote(id),
        body.trim_end()
    )
}

/// Register on-demand chunk files and run the entry's startup modules
pub fn startup(chunk_map: &BTreeMap<ModuleId, Vec<String>>, startup: &[ModuleId]) -> String {
    let mut out = String::from("(function (require) {\n");
    if !chunk_map.is_empty() {
        let map = serde_json::to_string(chunk_map).unwrap_or_else(|_| "{}".to_string());
        out.push_str(&format!(
            "  var chunks = {};\n  for (var id in chunks) require.m[id] = chunks[id];\n",
            map
        ));
    }
    for id in startup {
        out.push_str(&format!("  require({});\n", quote(id)));
    }
    out.push_str(&format!("}})(self.{});\n", RUNTIME_GLOBAL));
    out
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_is_guarded() {
        let runtime = runtime_source();
        assert!(runtime.contains("if (root.__kilnRequire) return;"));
        assert!(runtime.contains("require.e = function (id)"));
        assert!(runtime.contains("root.__kilnChunks = root.__kilnChunks || []"));
    }

    #[test]
    fn test_chunk_wrapping() {
        let chunk = format!(
            "{}{}{}",
            chunk_header(&["app"]),
            module_factory("./src/index.ts", "console.log(1);\n"),
            CHUNK_FOOTER
        );
        assert_eq!(
            chunk,
            "(self.__kilnChunks = self.__kilnChunks || []).push([[\"app\"], {\n\"./src/index.ts\": function (module, exports, require) {\nconsole.log(1);\n},\n}]);\n"
        );
    }

    #[test]
    fn test_startup_registers_map_then_requires() {
        let mut map = BTreeMap::new();
        map.insert("./src/Alarm.tsx".to_string(), vec!["/alarm.1234abcd.js".to_string()]);
        let code = startup(&map, &["./src/index.ts".to_string()]);
        let register = code.find("require.m[id]").unwrap();
        let run = code.find("require(\"./src/index.ts\")").unwrap();
        assert!(register < run);
        assert!(code.ends_with("})(self.__kilnRequire);\n"));
    }
}
