use serde::Serialize;

use deskbot_core::flows::DialogCommand;

/// A command shown in help output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PublicCommand {
    pub name: &'static str,
    pub description: &'static str,
}

pub fn description(command: DialogCommand) -> Option<&'static str> {
    match command {
        DialogCommand::CreateRequest => Some("create a support request"),
        DialogCommand::Help => Some("list available commands"),
        _ => None,
    }
}

/// Public commands sorted by name, the order help lists them in.
pub fn public_commands() -> Vec<PublicCommand> {
    let mut commands: Vec<PublicCommand> = DialogCommand::ALL
        .into_iter()
        .filter(|command| command.is_public())
        .filter_map(|command| {
            description(command)
                .map(|description| PublicCommand { name: command.as_str(), description })
        })
        .collect();
    commands.sort_by(|left, right| left.name.cmp(right.name));
    commands
}
