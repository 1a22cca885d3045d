use std::collections::HashMap;

use super::types::State;

pub fn valid_state_transition(src: &State, dst: &State) -> bool {
    let state_transition_map: HashMap<State, Vec<State>> = {
        let mut map = HashMap::new();
        map.insert(State::Created, vec![State::Queued, State::Failed]);
        map.insert(State::Queued, vec![State::Requested, State::Failed]);
        map.insert(State::Requested, vec![State::Started, State::Failed]);
        map.insert(State::Started, vec![State::Finished, State::Failed]);
        map.insert(State::Finished, vec![]);
        map.insert(State::Failed, vec![]);
        map
    };

    if let Some(valid_states) = state_transition_map.get(src) {
        valid_states.contains(dst)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORWARD: [State; 5] = [
        State::Created,
        State::Queued,
        State::Requested,
        State::Started,
        State::Finished,
    ];

    #[test]
    fn forward_chain_is_linear() {
        for pair in FORWARD.windows(2) {
            assert!(valid_state_transition(&pair[0], &pair[1]));
        }
        assert!(!valid_state_transition(&State::Created, &State::Requested));
        assert!(!valid_state_transition(&State::Queued, &State::Started));
        assert!(!valid_state_transition(&State::Requested, &State::Finished));
    }

    #[test]
    fn failed_reachable_from_every_non_terminal_state() {
        for state in &FORWARD[..4] {
            assert!(valid_state_transition(state, &State::Failed), "{state:?}");
        }
    }

    #[test]
    fn no_regression() {
        assert!(!valid_state_transition(&State::Started, &State::Queued));
        assert!(!valid_state_transition(&State::Requested, &State::Created));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        let all = [
            State::Created,
            State::Queued,
            State::Requested,
            State::Started,
            State::Finished,
            State::Failed,
        ];
        for dst in &all {
            assert!(!valid_state_transition(&State::Finished, dst));
            assert!(!valid_state_transition(&State::Failed, dst));
        }
        assert!(State::Finished.is_terminal());
        assert!(State::Failed.is_terminal());
        assert!(!State::Started.is_terminal());
    }
}
