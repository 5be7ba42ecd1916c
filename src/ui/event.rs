//! 键盘事件
//!
//! 轮询 crossterm 键盘事件：F2/F3 切换两个阶段的显示，Ctrl+N 新会话，Ctrl+Q 退出；
//! 其余按键交给 run_app 编辑输入缓冲，Enter 时 send_submit。

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use crate::core::Command;

/// 应用事件：来自快捷键的 Command 或原始 KeyEvent
#[derive(Debug, Clone)]
pub enum AppEvent {
    Command(Command),
    Key(KeyEvent),
}

pub struct EventHandler {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl EventHandler {
    pub fn new(cmd_tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { cmd_tx }
    }

    pub fn poll(&self) -> anyhow::Result<Option<AppEvent>> {
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(Some(self.handle_key(key)));
                }
            }
        }
        Ok(None)
    }

    /// 快捷键直接发送命令（Quit 由 run_app 负责转发并退出）
    fn handle_key(&self, key: KeyEvent) -> AppEvent {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let cmd = match key.code {
            KeyCode::F(2) => Command::ToggleResearch,
            KeyCode::F(3) => Command::ToggleMentor,
            KeyCode::Char('n') if ctrl => Command::NewSession,
            KeyCode::Char('q') if ctrl => return AppEvent::Command(Command::Quit),
            _ => return AppEvent::Key(key),
        };
        let _ = self.cmd_tx.send(cmd.clone());
        AppEvent::Command(cmd)
    }

    pub fn send_submit(&self, input: String) {
        let _ = self.cmd_tx.send(Command::Submit(input));
    }

    pub fn send(&self, cmd: Command) {
        let _ = self.cmd_tx.send(cmd);
    }
}
