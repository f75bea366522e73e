//! Embedded control page.
//!
//! A single static HTML page; all state flows through the JSON endpoints,
//! so nothing is templated server-side.

pub(crate) const CONTROL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>doorwatch</title>
    <style>
        body { font-family: Arial, sans-serif; background: #111; color: #eee; text-align: center; }
        h1 { color: #0f0; }
        input, button { margin: 8px; padding: 8px; border-radius: 6px; }
        img { border-radius: 12px; margin-top: 15px; }
        .result { margin-top: 10px; font-size: 1.2em; }
        .status { margin: 10px; padding: 10px; border-radius: 8px; background: #222; }
        .toggle { background: #28a745; color: white; font-weight: bold; }
        .danger { background: #dc3545; color: white; }
    </style>
</head>
<body>
    <h1>doorwatch</h1>

    <div class="status">
        <strong>Auto-capture:</strong>
        <span id="autoStatus">enabled</span>
        <button class="toggle" onclick="toggleAuto()">Toggle</button>
    </div>

    <form id="addForm" enctype="multipart/form-data">
        <input type="text" name="name" placeholder="Name" required>
        <input type="file" name="image" accept="image/*" required>
        <button type="submit">Enroll Face</button>
    </form>

    <hr>
    <button onclick="capture()">Capture &amp; Detect</button>
    <button onclick="unlockDoor()">Unlock Door</button>
    <button class="danger" onclick="lockDoor()">Lock Door</button>
    <button onclick="refreshLatest()">Refresh Latest</button>
    <div class="result" id="result"></div>
    <img id="preview" width="320"/>

    <script>
        setInterval(refreshLatest, 2000);

        document.getElementById('addForm').onsubmit = async (e) => {
            e.preventDefault();
            const formData = new FormData(e.target);
            const res = await fetch('/add_face', { method: 'POST', body: formData });
            const data = await res.json();
            alert(data.message || data.error);
        };

        async function capture() {
            document.getElementById('result').innerHTML = 'Capturing...';
            const res = await fetch('/capture');
            const data = await res.json();
            if (data.error) {
                document.getElementById('result').innerHTML = data.error;
                return;
            }
            document.getElementById('preview').src = 'data:image/jpeg;base64,' + data.image;
            document.getElementById('result').innerHTML = data.result;
        }

        async function refreshLatest() {
            const res = await fetch('/latest_capture');
            const data = await res.json();
            if (data.result && data.image) {
                document.getElementById('preview').src = 'data:image/jpeg;base64,' + data.image;
                document.getElementById('result').innerHTML = data.result + ' <small>(auto)</small>';
            }
        }

        async function toggleAuto() {
            const res = await fetch('/toggle_auto');
            const data = await res.json();
            const status = document.getElementById('autoStatus');
            status.innerHTML = data.enabled ? 'enabled' : 'disabled';
            status.style.color = data.enabled ? '#0f0' : '#f00';
        }

        async function unlockDoor() {
            const res = await fetch('/unlock_door');
            const data = await res.json();
            alert(data.message || data.error);
        }

        async function lockDoor() {
            const res = await fetch('/lock_door');
            const data = await res.json();
            alert(data.message || data.error);
        }
    </script>
</body>
</html>
"#;
