//! Maps a settings snapshot to sqlfmt command-line flags.

use crate::config::{FormatSettings, KeywordCase};

/// Builds the argument list for one sqlfmt invocation.
///
/// With `use_config_file` set, sqlfmt reads its own config file and no flags
/// are passed. Otherwise flags follow a fixed order: newlines, keyword case,
/// indentation, line width, comment spacing, text-group alignment.
///
/// `--comment-pre-space` and `--align-text-groups` need a sqlfmt release that
/// understands them. Older releases reject unknown flags, which shows up as
/// [`FormatError::Tool`](crate::invoke::FormatError::Tool) on every run while
/// either option is enabled.
pub fn build_args(settings: &FormatSettings) -> Vec<String> {
    let mut args = Vec::new();

    if settings.use_config_file {
        return args;
    }

    if settings.replace_newlines {
        args.push("-n".to_string());
    }

    match settings.change_keyword_case {
        KeywordCase::Uppercase => args.push("-u".to_string()),
        KeywordCase::Lowercase => args.push("-l".to_string()),
        KeywordCase::Unchanged => {}
    }

    if settings.use_tabs {
        args.push("-t".to_string());
    } else if let Some(count) = settings.set_space_count {
        args.push("-s".to_string());
        args.push(count.to_string());
    }

    if let Some(count) = settings.set_char_count {
        args.push("-c".to_string());
        args.push(count.to_string());
    }

    if settings.replace_comment_pre_space {
        args.push("--comment-pre-space".to_string());
    }

    if settings.align_text_groups {
        args.push("--align-text-groups".to_string());
    }

    args
}
