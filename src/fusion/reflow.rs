/// Merge lines broken by a trailing hyphen with the line that follows.
///
/// The hyphen is dropped when the continuation starts lower-case (`dra-` +
/// `gon` → `dragon`) and kept otherwise (`Anglo-` + `Saxon`).
pub fn reflow_hyphenated(lines: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut pending: Option<String> = None;

    for line in lines {
        let merged = match pending.take() {
            Some(head) => {
                let tail = line.trim_start();
                let joins_word = tail.chars().next().map(|c| c.is_lowercase()).unwrap_or(false);
                if joins_word {
                    format!("{}{}", head.trim_end().trim_end_matches('-'), tail)
                } else {
                    format!("{}{}", head.trim_end(), tail)
                }
            }
            None => line,
        };
        if is_hyphen_broken(&merged) {
            pending = Some(merged);
        } else {
            out.push(merged);
        }
    }
    if let Some(rest) = pending {
        out.push(rest);
    }
    out
}

fn is_hyphen_broken(line: &str) -> bool {
    let trimmed = line.trim_end();
    let mut rev = trimmed.chars().rev();
    matches!((rev.next(), rev.next()), (Some('-'), Some(c)) if c.is_alphabetic())
}
