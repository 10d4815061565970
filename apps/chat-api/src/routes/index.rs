use axum::response::Html;
use axum::routing::get;
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

const STATUS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>MiniTalk relay</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .status { padding: 10px; margin: 10px 0; border-radius: 5px; }
        .success { background: #d4edda; color: #155724; }
        .error { background: #f8d7da; color: #721c24; }
    </style>
</head>
<body>
    <h1>MiniTalk relay</h1>
    <div id="status" class="status">Checking server status...</div>
    <h3>Endpoints</h3>
    <ul>
        <li><a href="/health">/health</a> - server health</li>
        <li><a href="/info">/info</a> - configured limits</li>
        <li><code>/ws</code> - chat WebSocket</li>
    </ul>
    <script>
        fetch('/health')
            .then(r => r.json())
            .then(data => {
                const el = document.getElementById('status');
                el.className = 'status success';
                el.textContent = 'Server is running. Connected users: ' + data.connectedUsers;
            })
            .catch(err => {
                const el = document.getElementById('status');
                el.className = 'status error';
                el.textContent = 'Server error: ' + err.message;
            });
    </script>
</body>
</html>
"#;

async fn index() -> Html<&'static str> {
    Html(STATUS_PAGE)
}
