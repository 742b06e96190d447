//! Transfer counters reported by the tools.

/// Byte and file counts extracted from a backup run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParsedStats {
    /// Bytes processed, when reported.
    pub bytes_processed: Option<u64>,
    /// Files processed, when reported.
    pub files_processed: Option<u64>,
}

/// Parses the leading number of `text`, accepting `,` thousands separators.
///
/// `"1,234,567 bytes"` yields `1234567`; text that does not start with a
/// digit yields `None`.
pub(crate) fn leading_number(text: &str) -> Option<u64> {
    let digits: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Returns the text after `label:` on the first line starting with `label`.
pub(crate) fn labelled_value<'a>(output: &'a str, label: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        line.trim_start()
            .strip_prefix(label)
            .and_then(|rest| rest.trim_start().strip_prefix(':'))
    })
}
