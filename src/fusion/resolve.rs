use crate::core::model::{AlignedLine, LineCandidate};
use crate::fusion::align::{align_lines, OpKind, Opcode};
use crate::fusion::compare::{comparison_key, content_len, line_distance, line_similarity};

/// Distance recorded for positions only one side of an alignment produced.
pub const UNMATCHED_DISTANCE: f32 = 1.0;

/// An alternate line in an uneven replace block is already present when it
/// is this similar to one of the block's primary lines.
const REPRESENTED_SIMILARITY: f32 = 0.65;

/// Fused lines after merging one alternate, plus the distance measured
/// against that alternate at every output position.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub lines: Vec<AlignedLine>,
    pub distances: Vec<f32>,
}

/// Merge one alternate reading into the running fused sequence.
///
/// `prior` lists the providers already folded into `fused`, so inserted
/// positions can carry an explicit "no line" candidate for each of them.
pub fn resolve_alternate(
    fused: Vec<AlignedLine>,
    prior: &[String],
    provider: &str,
    alternate: &[String],
    drop_threshold: f32,
) -> Resolution {
    let primary_texts: Vec<String> = fused.iter().map(|line| line.text.clone()).collect();
    let ops = align_lines(&primary_texts, alternate);

    let mut slots: Vec<Option<AlignedLine>> = fused.into_iter().map(Some).collect();
    let mut out = Resolution {
        lines: Vec::with_capacity(slots.len().max(alternate.len())),
        distances: Vec::new(),
    };

    for op in ops {
        let primary: Vec<AlignedLine> = slots[op.a_start..op.a_end]
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        let alt = &alternate[op.b_start..op.b_end];
        match op.kind {
            OpKind::Equal => {
                for (mut line, text) in primary.into_iter().zip(alt) {
                    line.candidates.push(candidate(provider, Some(text)));
                    out.push(line, 0.0);
                }
            }
            OpKind::Delete => {
                for line in primary {
                    out.push(keep_unmatched(line, provider), UNMATCHED_DISTANCE);
                }
            }
            OpKind::Insert => {
                for text in alt {
                    out.push(adopt_inserted(text, prior, provider), UNMATCHED_DISTANCE);
                }
            }
            OpKind::Replace => {
                resolve_replace(&mut out, op, primary, alt, prior, provider, drop_threshold)
            }
        }
    }
    out
}

impl Resolution {
    fn push(&mut self, line: AlignedLine, distance: f32) {
        self.lines.push(line);
        self.distances.push(distance);
    }
}

fn candidate(provider: &str, text: Option<&String>) -> LineCandidate {
    LineCandidate {
        provider: provider.to_string(),
        text: text.cloned(),
    }
}

fn keep_unmatched(mut line: AlignedLine, provider: &str) -> AlignedLine {
    line.candidates.push(candidate(provider, None));
    line.distance = line.distance.max(UNMATCHED_DISTANCE);
    line
}

fn adopt_inserted(text: &String, prior: &[String], provider: &str) -> AlignedLine {
    let mut candidates: Vec<LineCandidate> = prior.iter().map(|p| candidate(p, None)).collect();
    candidates.push(candidate(provider, Some(text)));
    AlignedLine {
        text: text.clone(),
        source: provider.to_string(),
        distance: UNMATCHED_DISTANCE,
        candidates,
        repairs: Vec::new(),
    }
}

/// Vote between a primary line and its paired alternate line. The result is
/// always one of the two inputs verbatim.
fn resolve_pair(
    mut line: AlignedLine,
    alt: &String,
    provider: &str,
    drop_threshold: f32,
) -> (AlignedLine, f32) {
    let distance = line_distance(&line.text, alt);
    line.candidates.push(candidate(provider, Some(alt)));
    if distance <= drop_threshold && content_len(alt) > content_len(&line.text) {
        line.text = alt.clone();
        line.source = provider.to_string();
        line.distance = distance;
    } else {
        line.distance = line.distance.max(distance);
    }
    (line, distance)
}

fn resolve_replace(
    out: &mut Resolution,
    op: Opcode,
    primary: Vec<AlignedLine>,
    alt: &[String],
    prior: &[String],
    provider: &str,
    drop_threshold: f32,
) {
    debug_assert_eq!(primary.len(), op.a_end - op.a_start);
    let pairs = pair_block(&primary, alt);
    let block_text = comparison_key(
        &primary
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
    );
    let primary_texts: Vec<String> = primary.iter().map(|line| line.text.clone()).collect();

    let mut primary = primary.into_iter();
    for pair in pairs {
        match pair {
            (Some(_), Some(j)) => {
                if let Some(line) = primary.next() {
                    let (line, distance) = resolve_pair(line, &alt[j], provider, drop_threshold);
                    out.push(line, distance);
                }
            }
            (Some(_), None) => {
                if let Some(line) = primary.next() {
                    out.push(keep_unmatched(line, provider), UNMATCHED_DISTANCE);
                }
            }
            (None, Some(j)) => {
                let text = &alt[j];
                let key = comparison_key(text);
                let represented = block_text.contains(&key)
                    || primary_texts
                        .iter()
                        .any(|p| line_similarity(p, text) >= REPRESENTED_SIMILARITY);
                if !represented {
                    out.push(adopt_inserted(text, prior, provider), UNMATCHED_DISTANCE);
                }
            }
            (None, None) => {}
        }
    }
}

/// Monotonic pairing of a replace block maximizing summed line similarity.
/// Lines are paired positionally when both sides have the same count.
fn pair_block(primary: &[AlignedLine], alt: &[String]) -> Vec<(Option<usize>, Option<usize>)> {
    let (n, m) = (primary.len(), alt.len());
    if n == m {
        return (0..n).map(|i| (Some(i), Some(i))).collect();
    }

    let sim: Vec<Vec<f32>> = primary
        .iter()
        .map(|p| alt.iter().map(|a| line_similarity(&p.text, a)).collect())
        .collect();
    // score[i][j] = best total for primary[i..] against alt[j..], pairing as
    // many lines as the shorter side allows.
    let mut score = vec![vec![0.0f32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            let pair = sim[i][j] + 1.0 + score[i + 1][j + 1];
            score[i][j] = pair.max(score[i + 1][j]).max(score[i][j + 1]);
        }
    }

    let mut pairs = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        let pair = sim[i][j] + 1.0 + score[i + 1][j + 1];
        if (score[i][j] - pair).abs() < f32::EPSILON {
            pairs.push((Some(i), Some(j)));
            i += 1;
            j += 1;
        } else if (score[i][j] - score[i + 1][j]).abs() < f32::EPSILON {
            pairs.push((Some(i), None));
            i += 1;
        } else {
            pairs.push((None, Some(j)));
            j += 1;
        }
    }
    pairs.extend((i..n).map(|i| (Some(i), None)));
    pairs.extend((j..m).map(|j| (None, Some(j))));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seed(lines: &[&str]) -> Vec<AlignedLine> {
        lines
            .iter()
            .map(|text| AlignedLine::single(text.to_string(), "classic"))
            .collect()
    }

    fn owned(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    fn resolve(primary: &[&str], alt: &[&str]) -> Resolution {
        resolve_alternate(seed(primary), &owned(&["classic"]), "neural", &owned(alt), 0.35)
    }

    fn texts(res: &Resolution) -> Vec<&str> {
        res.lines.iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn agreement_keeps_text_with_zero_distance() {
        let page = ["You enter a cave.", "Turn to 42"];
        let res = resolve(&page, &page);
        assert_eq!(texts(&res), vec!["You enter a cave.", "Turn to 42"]);
        assert!(res.lines.iter().all(|line| line.distance == 0.0 && line.source == "classic"));
        assert_eq!(res.distances, vec![0.0, 0.0]);
    }

    #[test]
    fn close_longer_alternate_wins_a_replace() {
        let res = resolve(&["Tum t0 42"], &["Turn to 42"]);
        assert_eq!(texts(&res), vec!["Turn to 42"]);
        assert_eq!(res.lines[0].source, "neural");
        assert!((res.lines[0].distance - 0.3).abs() < 1e-6);
    }

    #[test]
    fn distant_alternate_keeps_primary_verbatim() {
        let res = resolve(&["The goblin attacks"], &["%%# @@ lorem ipsum dolor sit"]);
        assert_eq!(texts(&res), vec!["The goblin attacks"]);
        assert_eq!(res.lines[0].source, "classic");
        assert!(res.lines[0].distance > 0.35);
        assert_eq!(res.lines[0].candidates.len(), 2);
    }

    #[test]
    fn insert_adopts_and_delete_keeps() {
        let res = resolve(&["alpha", "beta", "only primary"], &["header", "alpha", "beta"]);
        assert_eq!(texts(&res), vec!["header", "alpha", "beta", "only primary"]);
        assert_eq!(res.lines[0].source, "neural");
        assert_eq!(res.lines[0].candidates[0].text, None);
        assert_eq!(res.lines[3].source, "classic");
        assert_eq!(res.distances, vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn replace_output_is_always_an_input_line() {
        let primary = ["the dark tower rises", "Tum t0 7", "a narrow ledge"];
        let alt = ["the dark tower rlses", "Turn to 7", "extra noise line", "a narow ledge"];
        let res = resolve(&primary, &alt);
        for line in &res.lines {
            assert!(
                primary.contains(&line.text.as_str()) || alt.contains(&line.text.as_str()),
                "invented line {:?}",
                line.text
            );
        }
        for p in primary.iter().filter(|p| **p != "Tum t0 7") {
            let kept = res.lines.iter().any(|line| line_similarity(&line.text, p) > 0.9);
            assert!(kept, "lost {p:?}");
        }
    }

    #[test]
    fn split_alternate_line_is_not_duplicated() {
        let res = resolve(
            &["You draw your sword and step forward"],
            &["You draw your sword", "and step forward"],
        );
        assert_eq!(texts(&res), vec!["You draw your sword and step forward"]);
    }
}
