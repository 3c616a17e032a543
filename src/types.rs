/// Dense vocabulary id occupying one slot of a fact.
/// Examples: `0`, `7127` (entity), `229` (relation), `364` (day index)
pub type Id = usize;
/// Pair of ids held fixed while the remaining slot is corrupted.
/// Example: `(predicate, object)` when corrupting the subject.
pub type ContextPair = (Id, Id);
/// Registered name of a negative sampling strategy.
/// Examples: `uniform`, `time_agnostic`, `no_sampling`
pub type StrategyName = String;
/// Raw vocabulary label before interning.
/// Examples: `South_Korea`, `Make_statement`, `2014-01-01`
pub type VocabLabel = String;
/// Label value attached to a candidate (1.0 positive, 0.0 negative).
pub type LabelValue = f32;
