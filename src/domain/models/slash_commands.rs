#[cfg(test)]
#[path = "slash_commands_test.rs"]
mod tests;

pub struct SlashCommand {
    command: String,
    pub args: Vec<String>,
}

impl SlashCommand {
    pub fn parse(text: &str) -> Option<SlashCommand> {
        let mut args = text
            .trim()
            .split(' ')
            .filter(|e| return !e.is_empty())
            .map(|e| return e.to_string())
            .collect::<Vec<String>>();
        if args.is_empty() {
            return None;
        }

        let prefix = args.remove(0);
        let cmd = SlashCommand {
            command: prefix,
            args,
        };
        if cmd.is_quit()
            || cmd.is_help()
            || cmd.is_todo_list()
            || cmd.is_model_list()
            || cmd.is_model_set()
            || cmd.is_retry()
            || cmd.is_reset()
        {
            return Some(cmd);
        }

        return None;
    }

    pub fn is_quit(&self) -> bool {
        return ["/q", "/quit", "/exit"].contains(&self.command.as_str());
    }

    pub fn is_help(&self) -> bool {
        return ["/h", "/help"].contains(&self.command.as_str());
    }

    pub fn is_todo_list(&self) -> bool {
        return ["/t", "/todos"].contains(&self.command.as_str());
    }

    pub fn is_model_list(&self) -> bool {
        return ["/ml", "/models", "/modellist"].contains(&self.command.as_str());
    }

    pub fn is_model_set(&self) -> bool {
        return ["/m", "/model"].contains(&self.command.as_str());
    }

    pub fn is_retry(&self) -> bool {
        return ["/r", "/retry"].contains(&self.command.as_str());
    }

    pub fn is_reset(&self) -> bool {
        return self.command == "/reset";
    }
}
