//! 控制台入口：逐行读取标准输入，作为同一会话的消息交给 Hive 处理
//!
//! 输入 `quit` / `exit` 或输入流结束时触发关闭。

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::{Hive, ShutdownManager, ShutdownReason};
use crate::execution::wait_all;

/// 把一行输入的处理结果渲染成一行输出
pub async fn handle_line(hive: &Hive, session_id: &str, line: &str) -> Vec<String> {
    let session = hive.get_or_create_session(session_id).await;
    let handles = match hive.handle_message(line, &session).await {
        Ok(h) => h,
        Err(e) => return vec![format!("error: {e}")],
    };
    wait_all(handles)
        .await
        .into_iter()
        .map(|r| match &r.outcome {
            Ok(value) => format!("{} -> {}", r.action, value),
            Err(e) => format!("{} failed after {} attempt(s): {}", r.action, r.attempts, e),
        })
        .collect()
}

/// 读取输入直到 quit、EOF 或关闭信号
pub async fn run_console<R, W>(
    hive: Arc<Hive>,
    session_id: String,
    shutdown: Arc<ShutdownManager>,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let token = shutdown.token();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            shutdown.shutdown(ShutdownReason::InputClosed);
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            shutdown.shutdown(ShutdownReason::UserInitiated);
            break;
        }
        for out in handle_line(&hive, &session_id, line).await {
            writer.write_all(out.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
    }
    Ok(())
}
