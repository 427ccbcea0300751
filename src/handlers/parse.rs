//! Chat command extraction.

/// Extract the command name from a chat message.
///
/// Only a leading `/word` token is a command: `/register:word extra` yields
/// `register:word`, while `hello /start` and `/ start` yield nothing. In group
/// chats Telegram appends `@botname`; that suffix is stripped only when it
/// names `bot_username` (case-insensitive), so an `@` inside a secret stays.
pub fn parse_command<'a>(text: &'a str, bot_username: Option<&str>) -> Option<&'a str> {
    let token = text.split_whitespace().next()?;
    let token = token.strip_prefix('/')?;

    let name = match (token.rsplit_once('@'), bot_username) {
        (Some((name, addressed)), Some(bot)) if addressed.eq_ignore_ascii_case(bot) => name,
        _ => token,
    };

    (!name.is_empty()).then_some(name)
}
