//! Design encoding: observations → sparse design rows.
//!
//! Each term contributes at most one non-zero column per observation:
//! numeric variables multiply, and factor variables select one column by
//! their level. A factor inside a term is contrast-coded (baseline level has
//! no column) when the term with that factor removed is also in the model,
//! otherwise indicator-coded (one column per level). Levels are the sorted
//! distinct values seen in the fitted rows, so unused levels are dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::spec::{ModelSpec, Observation, Term, Var};

/// Sparse row: `(column, value)` pairs, columns strictly increasing.
pub type SparseRow = Vec<(usize, f64)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Coding {
    Contrast,
    Indicator,
}

#[derive(Clone, Debug)]
struct FactorSlot {
    /// Position of the variable in `Design::vars`.
    pos: usize,
    coding: Coding,
    width: usize,
}

#[derive(Clone, Debug)]
struct TermLayout {
    offset: usize,
    width: usize,
    factors: Vec<FactorSlot>,
    numerics: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct Design {
    pub terms: Vec<Term>,
    vars: Vec<Var>,
    layouts: Vec<TermLayout>,
    levels: BTreeMap<Var, Vec<String>>,
    lookup: HashMap<Var, HashMap<String, usize>>,
    pub column_names: Vec<String>,
    /// Term index of every column.
    pub column_terms: Vec<usize>,
}

/// Values of the design variables for one observation.
struct Resolved {
    factor: Vec<usize>,
    numeric: Vec<f64>,
}

impl Design {
    /// Build the column layout from the rows the model is fitted on.
    pub fn build<'a, O, I>(spec: &ModelSpec, rows: I) -> Design
    where
        O: Observation + 'a,
        I: IntoIterator<Item = &'a O>,
    {
        let vars = spec.variables();
        let mut seen: BTreeMap<Var, BTreeSet<String>> = vars
            .iter()
            .filter(|v| v.is_factor())
            .map(|v| (*v, BTreeSet::new()))
            .collect();
        for row in rows {
            for (var, set) in seen.iter_mut() {
                if let Some(level) = row.level(*var) {
                    if !set.contains(level) {
                        set.insert(level.to_string());
                    }
                }
            }
        }
        let levels: BTreeMap<Var, Vec<String>> = seen
            .into_iter()
            .map(|(v, set)| (v, set.into_iter().collect()))
            .collect();
        let lookup = levels
            .iter()
            .map(|(v, ls)| {
                let map = ls
                    .iter()
                    .enumerate()
                    .map(|(i, l)| (l.clone(), i))
                    .collect();
                (*v, map)
            })
            .collect();

        let terms = spec.terms();
        let pos_of = |v: Var| vars.iter().position(|x| *x == v).unwrap_or(usize::MAX);
        let mut layouts = Vec::with_capacity(terms.len());
        let mut column_names = Vec::new();
        let mut column_terms = Vec::new();
        let mut offset = 0usize;

        for (ti, term) in terms.iter().enumerate() {
            let mut factors = Vec::new();
            let mut numerics = Vec::new();
            for &v in &term.vars {
                if v.is_factor() {
                    let reduced: Vec<Var> = term.vars.iter().copied().filter(|x| *x != v).collect();
                    let coding = if reduced.is_empty() || terms.iter().any(|t| t.same_vars(&reduced)) {
                        Coding::Contrast
                    } else {
                        Coding::Indicator
                    };
                    let n_levels = levels.get(&v).map(|l| l.len()).unwrap_or(0);
                    let width = match coding {
                        Coding::Contrast => n_levels.saturating_sub(1),
                        Coding::Indicator => n_levels,
                    };
                    factors.push(FactorSlot {
                        pos: pos_of(v),
                        coding,
                        width,
                    });
                } else {
                    numerics.push(pos_of(v));
                }
            }
            let width: usize = factors.iter().map(|f| f.width).product();

            for j in 0..width {
                column_names.push(column_name(term, &factors, &vars, &levels, j));
                column_terms.push(ti);
            }
            layouts.push(TermLayout {
                offset,
                width,
                factors,
                numerics,
            });
            offset += width;
        }

        Design {
            terms,
            vars,
            layouts,
            levels,
            lookup,
            column_names,
            column_terms,
        }
    }

    pub fn num_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Sorted levels of a factor as seen at build time.
    pub fn levels(&self, var: Var) -> &[String] {
        self.levels.get(&var).map(|l| l.as_slice()).unwrap_or(&[])
    }

    /// Columns belonging to the term with exactly these variables.
    pub fn term_columns(&self, vars: &[Var]) -> Vec<usize> {
        match self.terms.iter().position(|t| t.same_vars(vars)) {
            Some(ti) => {
                let l = &self.layouts[ti];
                (l.offset..l.offset + l.width).collect()
            }
            None => Vec::new(),
        }
    }

    /// Encode an observation; `None` if any variable is missing, non-finite,
    /// or a factor level was not seen at build time.
    pub fn encode<O: Observation + ?Sized>(&self, obs: &O) -> Option<SparseRow> {
        self.encode_with(obs, &[])
    }

    /// Encode with numeric variables overridden.
    pub fn encode_with<O: Observation + ?Sized>(
        &self,
        obs: &O,
        overrides: &[(Var, f64)],
    ) -> Option<SparseRow> {
        let resolved = self.resolve(obs, overrides)?;
        let mut row = SparseRow::new();
        'terms: for layout in &self.layouts {
            if layout.width == 0 {
                continue;
            }
            let mut value = 1.0;
            for &p in &layout.numerics {
                value *= resolved.numeric[p];
            }
            if value == 0.0 {
                continue;
            }
            let mut index = 0usize;
            let mut stride = 1usize;
            for slot in &layout.factors {
                let level = resolved.factor[slot.pos];
                let code = match slot.coding {
                    Coding::Contrast if level == 0 => continue 'terms,
                    Coding::Contrast => level - 1,
                    Coding::Indicator => level,
                };
                index += code * stride;
                stride *= slot.width;
            }
            row.push((layout.offset + index, value));
        }
        Some(row)
    }

    /// Exact partial derivative of the design row with respect to `var`.
    ///
    /// Every term is linear in each of its variables, so the unit difference
    /// `x(var = 1) - x(var = 0)` is the derivative at any value of `var`.
    pub fn partial<O: Observation + ?Sized>(
        &self,
        obs: &O,
        var: Var,
        overrides: &[(Var, f64)],
    ) -> Option<SparseRow> {
        let mut hi: Vec<(Var, f64)> = overrides.iter().copied().filter(|(v, _)| *v != var).collect();
        let mut lo = hi.clone();
        hi.push((var, 1.0));
        lo.push((var, 0.0));
        let a = self.encode_with(obs, &hi)?;
        let b = self.encode_with(obs, &lo)?;
        Some(sparse_sub(&a, &b))
    }

    fn resolve<O: Observation + ?Sized>(&self, obs: &O, overrides: &[(Var, f64)]) -> Option<Resolved> {
        let mut factor = vec![0usize; self.vars.len()];
        let mut numeric = vec![0.0f64; self.vars.len()];
        for (i, &v) in self.vars.iter().enumerate() {
            if v.is_factor() {
                let level = obs.level(v)?;
                factor[i] = *self.lookup.get(&v)?.get(level)?;
            } else {
                let x = match overrides.iter().find(|(o, _)| *o == v) {
                    Some((_, x)) => *x,
                    None => obs.value(v)?,
                };
                if !x.is_finite() {
                    return None;
                }
                numeric[i] = x;
            }
        }
        Some(Resolved { factor, numeric })
    }
}

fn column_name(
    term: &Term,
    factors: &[FactorSlot],
    vars: &[Var],
    levels: &BTreeMap<Var, Vec<String>>,
    mut j: usize,
) -> String {
    if term.vars.is_empty() {
        return "(Intercept)".to_string();
    }
    let mut factor_labels: HashMap<Var, String> = HashMap::new();
    for slot in factors {
        let var = vars[slot.pos];
        let code = j % slot.width;
        j /= slot.width;
        let level_idx = match slot.coding {
            Coding::Contrast => code + 1,
            Coding::Indicator => code,
        };
        let level = levels
            .get(&var)
            .and_then(|l| l.get(level_idx))
            .map(|s| s.as_str())
            .unwrap_or("?");
        factor_labels.insert(var, format!("{}{}", var, level));
    }
    term.vars
        .iter()
        .map(|v| factor_labels.remove(v).unwrap_or_else(|| v.to_string()))
        .collect::<Vec<_>>()
        .join(":")
}

/// `a - b` for sorted sparse rows, exact zeros removed.
pub fn sparse_sub(a: &SparseRow, b: &SparseRow) -> SparseRow {
    let mut out = SparseRow::with_capacity(a.len() + b.len());
    let (mut i, mut k) = (0, 0);
    while i < a.len() || k < b.len() {
        let next = match (a.get(i), b.get(k)) {
            (Some(&(ca, va)), Some(&(cb, vb))) if ca == cb => {
                i += 1;
                k += 1;
                (ca, va - vb)
            }
            (Some(&(ca, va)), Some(&(cb, _))) if ca < cb => {
                i += 1;
                (ca, va)
            }
            (Some(_), Some(&(cb, vb))) => {
                k += 1;
                (cb, -vb)
            }
            (Some(&(ca, va)), None) => {
                i += 1;
                (ca, va)
            }
            (None, Some(&(cb, vb))) => {
                k += 1;
                (cb, -vb)
            }
            (None, None) => break,
        };
        if next.1 != 0.0 {
            out.push(next);
        }
    }
    out
}

/// Weighted accumulation of sparse rows into a dense-indexed map.
#[derive(Default, Debug, Clone)]
pub struct SparseAccumulator {
    entries: BTreeMap<usize, f64>,
}

impl SparseAccumulator {
    pub fn add(&mut self, row: &SparseRow, weight: f64) {
        for &(c, v) in row {
            *self.entries.entry(c).or_insert(0.0) += weight * v;
        }
    }

    pub fn into_row(self) -> SparseRow {
        self.entries.into_iter().filter(|(_, v)| *v != 0.0).collect()
    }
}
