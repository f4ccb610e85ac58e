/// Browser side of the live-update channel, injected into the dev page.
/// Stylesheet updates swap matching `<link>` tags; anything else reloads the page.
pub fn generate_hmr_client_code(port: u16) -> String {
    format!(
        r#"<script>
(function () {{
  var url = "ws://" + (location.hostname || "localhost") + ":{port}";
  var attempts = 0;

  function swapStyles(files) {{
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var swapped = 0;
    files.forEach(function (file) {{
      links.forEach(function (link) {{
        var href = link.getAttribute("href") || "";
        if (href.split("?")[0].slice(-file.length) !== file) return;
        var next = link.cloneNode();
        next.href = href.split("?")[0] + "?t=" + Date.now();
        next.onload = function () {{ link.remove(); }};
        link.parentNode.insertBefore(next, link.nextSibling);
        swapped++;
      }});
    }});
    return swapped > 0;
  }}

  function connect() {{
    var socket = new WebSocket(url);
    socket.onopen = function () {{ attempts = 0; }};
    socket.onmessage = function (event) {{
      var message;
      try {{ message = JSON.parse(event.data); }} catch (e) {{ return; }}
      if (message.type === "css-update") {{
        if (!swapStyles(message.files)) location.reload();
      }} else if (message.type === "full-reload") {{
        location.reload();
      }}
    }};
    socket.onclose = function () {{
      if (attempts++ < 10) setTimeout(connect, 1000);
    }};
  }}

  connect();
}})();
</script>
"#,
        port = port
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_targets_port_and_message_types() {
        let code = generate_hmr_client_code(3091);
        assert!(code.starts_with("<script>"));
        assert!(code.contains(":3091\""));
        assert!(code.contains("\"css-update\""));
        assert!(code.contains("\"full-reload\""));
        assert!(code.contains("location.reload()"));
    }
}
