use crate::cert::RecordColumn;
use crate::cli::args::{Cli, CompletionCommands, CompletionHelperCommands};
use crate::utils::errors::Result;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io;

const APP_NAME: &str = "zcert";

pub fn handle_completion_command(command: &CompletionCommands) -> Result<()> {
    let shell = command.shell();
    let mut cmd = Cli::command();

    // For bash, add column completion for `records list --columns` first
    if matches!(shell, Shell::Bash) {
        println!("# Enhanced completion for zcert record columns");
        print!(
            r#"
_zcert_complete_columns() {{
    local columns
    columns=$(zcert completion-helper columns 2>/dev/null)

    # Find the last comma to determine what we're completing
    local current_word="${{cur}}"
    local prefix=""
    if [[ "$current_word" == *,* ]]; then
        prefix="${{current_word%,*}},"
        current_word="${{current_word##*,}}"
    fi

    local word_list=""
    for col in $columns; do
        if [[ "$col" == "$current_word"* ]]; then
            word_list="$word_list ${{prefix}}${{col}}"
        fi
    done

    COMPREPLY=($(compgen -W "$word_list" -- "${{cur}}"))
}}

_zcert_override() {{
    local cur prev words cword
    _init_completion || return

    case "${{words[*]}}" in
        *"records list"*)
            if [[ "$prev" == "--columns" ]]; then
                _zcert_complete_columns
                return 0
            fi
            ;;
    esac

    # Fall back to the original completion
    _zcert "$@"
}}

"#
        );

        generate(shell, &mut cmd, APP_NAME, &mut io::stdout());

        println!();
        println!("# Override the completion function");
        println!("complete -F _zcert_override zcert");
    } else {
        generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    }

    Ok(())
}

pub fn handle_completion_helper_command(command: &CompletionHelperCommands) -> Result<()> {
    match command {
        CompletionHelperCommands::Columns => {
            for column in completion_columns() {
                println!("{column}");
            }
        }
    }
    Ok(())
}

/// Column names accepted by `records list --columns`, short aliases included
pub fn completion_columns() -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = RecordColumn::all().iter().map(RecordColumn::name).collect();
    columns.extend(["id", "hex", "cn", "e"]);
    columns
}
