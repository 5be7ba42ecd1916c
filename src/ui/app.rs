//! TUI 应用主循环
//!
//! 进入全屏/原始模式，轮询 state_rx、运行事件与键盘事件，将输入与快捷键转为 Command 发送给命令循环，
//! 每帧用 draw 渲染 UiState 与输入缓冲。

use std::io::{self, Stdout};

use crossterm::event::KeyCode;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::{broadcast, mpsc, watch};

use crate::core::{Command, UiState};
use crate::pipeline::PipelineEvent;
use crate::ui::event::{AppEvent, EventHandler};
use crate::ui::render::draw;

/// 运行事件的一行描述（输入框标题中显示）
pub fn describe_event(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::StageStarted { stage, index, total } => {
            Some(format!("[{}/{}] {} working…", index + 1, total, stage))
        }
        PipelineEvent::ToolCall { stage, tool, .. } => Some(format!("{} → {}", stage, tool)),
        PipelineEvent::Observation { stage, tool, .. } => Some(format!("{} ← {}", stage, tool)),
        PipelineEvent::HookFailed { reason, .. } => Some(format!("Memory save failed: {}", reason)),
        PipelineEvent::StageOutput(_) | PipelineEvent::Completed | PipelineEvent::Failed { .. } => None,
    }
}

/// 运行 TUI：启用原始模式与全屏，循环 poll 事件 + 渲染，退出时恢复终端
pub async fn run_app(
    state_rx: watch::Receiver<UiState>,
    mut event_rx: broadcast::Receiver<PipelineEvent>,
    cmd_tx: mpsc::UnboundedSender<Command>,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let event_handler = EventHandler::new(cmd_tx);
    let mut input_buffer = String::new();
    let mut conversation_scroll = 0usize;
    let mut last_transcript_len = 0usize;
    let mut activity: Option<String> = None;

    loop {
        let state = state_rx.borrow().clone();

        if state.transcript.len() != last_transcript_len {
            last_transcript_len = state.transcript.len();
            conversation_scroll = usize::MAX;
        }

        loop {
            match event_rx.try_recv() {
                Ok(ev) => {
                    if let Some(text) = describe_event(&ev) {
                        activity = Some(text);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::debug!("UI lagged {} events", n);
                }
                Err(_) => break,
            }
        }
        if !state.input_locked {
            activity = None;
        }

        if let Ok(Some(ev)) = event_handler.poll() {
            match ev {
                AppEvent::Command(Command::Quit) => {
                    event_handler.send(Command::Quit);
                    break;
                }
                AppEvent::Command(_) => {}
                AppEvent::Key(key) => match key.code {
                    KeyCode::Enter if !state.input_locked => {
                        let input = std::mem::take(&mut input_buffer);
                        event_handler.send_submit(input);
                    }
                    KeyCode::Backspace if !state.input_locked => {
                        input_buffer.pop();
                    }
                    KeyCode::Char(c) if !state.input_locked => input_buffer.push(c),
                    KeyCode::Up => conversation_scroll = conversation_scroll.saturating_sub(1),
                    KeyCode::Down => conversation_scroll = conversation_scroll.saturating_add(1),
                    KeyCode::PageUp => conversation_scroll = conversation_scroll.saturating_sub(10),
                    KeyCode::PageDown => conversation_scroll = conversation_scroll.saturating_add(10),
                    KeyCode::Home => conversation_scroll = 0,
                    KeyCode::End => conversation_scroll = usize::MAX,
                    _ => {}
                },
            }
        }

        let mut scroll_info = (0usize, 0usize);
        terminal.draw(|f| {
            draw(
                f,
                &state,
                &input_buffer,
                conversation_scroll,
                activity.as_deref(),
                &mut scroll_info,
            );
        })?;
        let (total_lines, viewport_height) = scroll_info;
        conversation_scroll = conversation_scroll.min(total_lines.saturating_sub(viewport_height));

        tokio::task::yield_now().await;
    }

    restore_terminal(&mut terminal)?;
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::TurnEvent;

    #[test]
    fn test_describe_event() {
        let started = PipelineEvent::StageStarted {
            stage: "research_agent".into(),
            index: 0,
            total: 2,
        };
        assert_eq!(describe_event(&started).unwrap(), "[1/2] research_agent working…");
        assert!(describe_event(&PipelineEvent::StageOutput(TurnEvent::new("a", "b"))).is_none());
    }
}
