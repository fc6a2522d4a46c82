mod candidate;
mod escape;
mod fuzzy;
mod providers;
mod vars;
mod wildcard;

pub use candidate::{Candidate, CompleteFlags};
pub use escape::escape_string;
pub use fuzzy::{fuzzy_match, natural_cmp, FuzzyMatch, MatchTier};
pub use providers::{
    ArgumentLists, Builtins, ExpandMode, Functions, NullArgumentLists, StaticBuiltins,
    StaticFunctions, StaticUsers, Subshell, SubshellOutput, SysUsers, Users,
};
pub use vars::VarsSnapshot;
pub use wildcard::{complete_against_pattern, wildcard_has, wildcard_matches, PatternCompletion};
