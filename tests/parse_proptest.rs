//! Property tests for the message parser.

use irc_link::Message;
use proptest::prelude::*;

proptest! {
    /// Parsing is total: arbitrary input may be rejected but never panics.
    #[test]
    fn parse_never_panics(input in "\\PC{0,200}") {
        let _ = input.parse::<Message>();
    }

    /// Structurally valid messages survive a serialize/parse cycle.
    #[test]
    fn structured_messages_round_trip(
        command in "[A-Z]{3,8}",
        middle in "[a-zA-Z0-9#]{1,10}",
        trailing in "[a-zA-Z0-9 ]{0,20}",
    ) {
        let msg = Message::new(
            command.clone(),
            vec![middle.clone(), trailing.clone()],
        );
        let reparsed: Message = msg.to_string().parse().unwrap();

        prop_assert_eq!(reparsed.command, command);
        prop_assert_eq!(reparsed.params.len(), 2);
        prop_assert_eq!(&reparsed.params[0], &middle);
        prop_assert_eq!(&reparsed.params[1], &trailing);
    }
}
