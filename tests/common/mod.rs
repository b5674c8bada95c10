use anyhow::Result;
use std::fs;
use std::path::Path;

/// One status-version 2 `CLIENT_LIST` row. Counters are from the server's side.
pub fn client_row(
    identity: &str,
    server_received: u64,
    server_sent: u64,
    since_unix: i64,
    client_id: u64,
) -> String {
    format!(
        "CLIENT_LIST,{identity},203.0.113.7:51234,10.8.0.6,,{server_received},{server_sent},2024-01-15 10:30:00,{since_unix},UNDEF,{client_id},0,AES-256-GCM"
    )
}

pub fn write_status(path: &Path, rows: &[String]) -> Result<()> {
    let mut content = String::from(
        "TITLE,OpenVPN 2.6.8 x86_64-pc-linux-gnu\n\
         HEADER,CLIENT_LIST,Common Name,Real Address,Virtual Address,Virtual IPv6 Address,Bytes Received,Bytes Sent,Connected Since,Connected Since (time_t),Username,Client ID,Peer ID,Data Channel Cipher\n",
    );
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    content.push_str("END\n");
    fs::write(path, content)?;
    Ok(())
}
