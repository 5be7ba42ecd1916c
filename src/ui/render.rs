//! 界面渲染
//!
//! 标题栏显示 phase、当前阶段与会话 ID；主体为对话记录（用户输入 + "Research Findings" / "Personalized Career Plan" 面板，
//! 按显示开关过滤、按宽度换行）；底部为输入框、运行动态与快捷键提示。

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};

use crate::advisor::{MENTOR_STAGE, RESEARCH_STAGE};
use crate::core::{AgentPhase, TranscriptEntry, UiState};

/// 阶段输出的面板标题与颜色
pub fn stage_heading(author: &str) -> (String, Color) {
    match author {
        RESEARCH_STAGE => ("🔬 Research Findings".to_string(), Color::Magenta),
        MENTOR_STAGE => ("🎓 Personalized Career Plan".to_string(), Color::Green),
        other => (format!("🤖 {}", other), Color::Gray),
    }
}

/// 按宽度换行（按字符计，不在 UTF-8 中间截断）
fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let chars: Vec<char> = para.chars().collect();
        if chars.is_empty() {
            lines.push(String::new());
            continue;
        }
        lines.extend(chars.chunks(width).map(|c| c.iter().collect::<String>()));
    }
    lines
}

/// 把可见的对话记录展开为渲染行
pub fn transcript_lines(state: &UiState, width: usize) -> Vec<Line<'static>> {
    let mut out: Vec<Line> = Vec::new();
    for entry in state.visible_transcript() {
        if !out.is_empty() {
            out.push(Line::from(""));
        }
        match entry {
            TranscriptEntry::User { text } => {
                for (i, line) in wrap_text(text, width.saturating_sub(4)).into_iter().enumerate() {
                    let prefix = if i == 0 { "You " } else { "    " };
                    out.push(Line::from(vec![
                        Span::styled(prefix, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
                        Span::raw(line),
                    ]));
                }
            }
            TranscriptEntry::Stage(turn) => {
                let (title, color) = stage_heading(&turn.author);
                out.push(Line::from(Span::styled(
                    title,
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                )));
                for line in wrap_text(&turn.text, width) {
                    out.push(Line::from(line));
                }
            }
        }
    }
    out
}

fn phase_label(state: &UiState) -> String {
    match (&state.phase, &state.active_stage) {
        (AgentPhase::Running, Some(stage)) => format!("Running {}", stage),
        (AgentPhase::ToolExecuting, Some(stage)) => format!("{} using tools", stage),
        (phase, _) => phase.label().to_string(),
    }
}

/// 绘制一帧；将 (总行数, 可视高度) 写入 out 供外部 clamp 滚动
pub fn draw(
    f: &mut Frame,
    state: &UiState,
    input_buffer: &str,
    conversation_scroll: usize,
    activity: Option<&str>,
    out: &mut (usize, usize),
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(5)])
        .split(f.area());

    let conv_area = chunks[0];
    // 边框 + 滚动条
    let content_width = conv_area.width.saturating_sub(3) as usize;

    let toggles = format!(
        "Research {} │ Plan {}",
        if state.show_research { "on" } else { "off" },
        if state.show_mentor { "on" } else { "off" }
    );
    let title = format!(
        " Career Advisor │ {} │ {} │ {} ",
        phase_label(state),
        state.session_id,
        toggles
    );
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let text_lines = transcript_lines(state, content_width.max(20));
    let content_height = conv_area.height.saturating_sub(2) as usize;
    let total_lines = text_lines.len();
    let scroll_offset = conversation_scroll.min(total_lines.saturating_sub(content_height));

    let inner = block.inner(conv_area);
    f.render_widget(block, conv_area);
    let paragraph = Paragraph::new(Text::from(text_lines))
        .wrap(Wrap { trim: false })
        .scroll((scroll_offset.min(u16::MAX as usize) as u16, 0));
    f.render_widget(paragraph, inner);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .position(scroll_offset)
            .viewport_content_length(content_height);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_symbol("█")
            .track_symbol(Some("░"));
        f.render_stateful_widget(scrollbar, inner, &mut scrollbar_state);
    }

    let input_title = if let Some(err) = &state.error_message {
        format!(" ⚠ {} ", err.chars().take(60).collect::<String>())
    } else if state.input_locked {
        format!(" {} ", activity.unwrap_or("Researching career transition paths…"))
    } else {
        " Describe your current role, experience, target role and weekly time ".to_string()
    };
    let border_color = if state.error_message.is_some() {
        Color::Red
    } else {
        Color::Blue
    };

    let hint = " Enter submit │ F2 research │ F3 plan │ Ctrl+N new session │ ↑↓ PgUp/PgDn scroll │ Ctrl+Q quit ";
    let input_block = Block::default()
        .title(input_title)
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let input = Paragraph::new(input_buffer)
        .block(input_block)
        .wrap(Wrap { trim: false })
        .style(if state.input_locked {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        });
    f.render_widget(input, chunks[1]);

    out.0 = total_lines;
    out.1 = content_height;
}
