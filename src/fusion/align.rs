use crate::fusion::compare::comparison_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Equal,
    Replace,
    Insert,
    Delete,
}

/// One block of the line alignment: `a[a_start..a_end]` against `b[b_start..b_end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub kind: OpKind,
    pub a_start: usize,
    pub a_end: usize,
    pub b_start: usize,
    pub b_end: usize,
}

impl Opcode {
    fn gap(a_start: usize, a_end: usize, b_start: usize, b_end: usize) -> Option<Self> {
        let kind = match (a_start < a_end, b_start < b_end) {
            (true, true) => OpKind::Replace,
            (true, false) => OpKind::Delete,
            (false, true) => OpKind::Insert,
            (false, false) => return None,
        };
        Some(Self {
            kind,
            a_start,
            a_end,
            b_start,
            b_end,
        })
    }
}

/// Longest-common-subsequence alignment treating each line as an atomic token.
pub fn align_lines<S: AsRef<str>>(a: &[S], b: &[S]) -> Vec<Opcode> {
    let a_keys: Vec<String> = a.iter().map(|line| comparison_key(line.as_ref())).collect();
    let b_keys: Vec<String> = b.iter().map(|line| comparison_key(line.as_ref())).collect();
    let (n, m) = (a_keys.len(), b_keys.len());

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a_keys[i] == b_keys[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut matches = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a_keys[i] == b_keys[j] {
            matches.push((i, j));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }

    let mut opcodes: Vec<Opcode> = Vec::new();
    let (mut pa, mut pb) = (0, 0);
    for (mi, mj) in matches {
        if let Some(gap) = Opcode::gap(pa, mi, pb, mj) {
            opcodes.push(gap);
        }
        match opcodes.last_mut() {
            Some(last) if last.kind == OpKind::Equal && last.a_end == mi && last.b_end == mj => {
                last.a_end += 1;
                last.b_end += 1;
            }
            _ => opcodes.push(Opcode {
                kind: OpKind::Equal,
                a_start: mi,
                a_end: mi + 1,
                b_start: mj,
                b_end: mj + 1,
            }),
        }
        pa = mi + 1;
        pb = mj + 1;
    }
    if let Some(gap) = Opcode::gap(pa, n, pb, m) {
        opcodes.push(gap);
    }
    opcodes
}
