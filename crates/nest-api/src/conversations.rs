//! Conversations are not stored. They are folded on every read from the flat
//! message history of one user: messages sharing the other participant and
//! the listing slot (including "no listing") form one conversation.
use std::collections::HashMap;

use uuid::Uuid;

use nest_db::models::MessageRow;
use nest_types::api::{ConversationResponse, LastMessage, ListingRef, UserSummary};

/// Identifies a conversation from one participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub other_user: Uuid,
    pub listing: Option<Uuid>,
}

impl ConversationKey {
    pub fn of(user_id: Uuid, message: &MessageRow) -> Self {
        let other_user = if message.sender_id == user_id {
            message.recipient_id
        } else {
            message.sender_id
        };
        Self {
            other_user,
            listing: message.listing_id,
        }
    }
}

/// The participant of `message` who is not `user_id`.
pub fn other_participant(user_id: Uuid, message: &MessageRow) -> UserSummary {
    if message.sender_id == user_id {
        UserSummary {
            id: message.recipient_id,
            name: message.recipient_name.clone(),
            email: message.recipient_email.clone(),
        }
    } else {
        UserSummary {
            id: message.sender_id,
            name: message.sender_name.clone(),
            email: message.sender_email.clone(),
        }
    }
}

pub fn listing_ref(message: &MessageRow) -> Option<ListingRef> {
    match (message.listing_id, &message.listing_title) {
        (Some(id), Some(title)) => Some(ListingRef {
            id,
            title: title.clone(),
        }),
        _ => None,
    }
}

/// Groups `messages` (every message `user_id` sent or received, newest first)
/// into conversations ordered by their latest message, newest first.
pub fn derive(user_id: Uuid, messages: &[MessageRow]) -> Vec<ConversationResponse> {
    let mut index: HashMap<ConversationKey, usize> = HashMap::new();
    let mut conversations: Vec<ConversationResponse> = Vec::new();

    for message in messages {
        let key = ConversationKey::of(user_id, message);
        let unread = message.recipient_id == user_id && !message.is_read;

        match index.get(&key) {
            Some(&i) => {
                let conversation = &mut conversations[i];
                conversation.message_count += 1;
                conversation.unread_count += usize::from(unread);
            }
            None => {
                index.insert(key, conversations.len());
                conversations.push(ConversationResponse {
                    other_user: other_participant(user_id, message),
                    listing: listing_ref(message),
                    last_message: LastMessage {
                        id: message.id,
                        content: message.content.clone(),
                        created_at: message.created_at,
                        is_from_me: message.sender_id == user_id,
                    },
                    message_count: 1,
                    unread_count: usize::from(unread),
                });
            }
        }
    }

    // Stable, so equal timestamps keep the scan order.
    conversations.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
    conversations
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;

    struct Person {
        id: Uuid,
        name: &'static str,
    }

    impl Person {
        fn new(name: &'static str) -> Self {
            Self { id: Uuid::new_v4(), name }
        }
    }

    fn message(
        from: &Person,
        to: &Person,
        listing: Option<(Uuid, &str)>,
        content: &str,
        at: DateTime<Utc>,
        is_read: bool,
    ) -> MessageRow {
        MessageRow {
            id: Uuid::new_v4(),
            sender_id: from.id,
            sender_name: from.name.to_string(),
            sender_email: format!("{}@uni.ac.uk", from.name),
            recipient_id: to.id,
            recipient_name: to.name.to_string(),
            recipient_email: format!("{}@uni.ac.uk", to.name),
            listing_id: listing.map(|(id, _)| id),
            listing_title: listing.map(|(_, title)| title.to_string()),
            subject: "Room".to_string(),
            content: content.to_string(),
            is_read,
            read_at: None,
            created_at: at,
        }
    }

    fn newest_first(mut messages: Vec<MessageRow>) -> Vec<MessageRow> {
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages
    }

    #[test]
    fn listing_slot_splits_conversations_with_the_same_person() {
        let a = Person::new("ana");
        let b = Person::new("ben");
        let l = (Uuid::new_v4(), "Attic room");
        let t0 = Utc::now();

        let messages = newest_first(vec![
            message(&a, &b, Some(l), "Is it free?", t0, true),
            message(&b, &a, Some(l), "Yes, from September", t0 + Duration::minutes(1), false),
            message(&a, &b, None, "Unrelated question", t0 + Duration::minutes(2), false),
        ]);

        let conversations = derive(a.id, &messages);
        assert_eq!(conversations.len(), 2);

        let general = &conversations[0];
        assert_eq!(general.other_user.id, b.id);
        assert!(general.listing.is_none());
        assert_eq!(general.message_count, 1);
        assert_eq!(general.unread_count, 0);
        assert_eq!(general.last_message.content, "Unrelated question");
        assert!(general.last_message.is_from_me);

        let about_room = &conversations[1];
        assert_eq!(about_room.listing.as_ref().map(|l| l.id), Some(l.0));
        assert_eq!(about_room.message_count, 2);
        assert_eq!(about_room.unread_count, 1);
        assert_eq!(about_room.last_message.content, "Yes, from September");
        assert!(!about_room.last_message.is_from_me);
    }

    #[test]
    fn unread_counts_only_messages_addressed_to_the_viewer() {
        let a = Person::new("ana");
        let b = Person::new("ben");
        let t0 = Utc::now();

        let messages = newest_first(vec![
            message(&a, &b, None, "one", t0, false),
            message(&a, &b, None, "two", t0 + Duration::seconds(1), false),
        ]);

        assert_eq!(derive(a.id, &messages)[0].unread_count, 0);
        assert_eq!(derive(b.id, &messages)[0].unread_count, 2);
        assert_eq!(derive(b.id, &messages)[0].other_user.name, "ana");
    }

    #[test]
    fn conversations_are_ordered_by_latest_message() {
        let a = Person::new("ana");
        let b = Person::new("ben");
        let c = Person::new("cat");
        let t0 = Utc::now();

        let messages = newest_first(vec![
            message(&b, &a, None, "old from ben", t0, false),
            message(&c, &a, None, "from cat", t0 + Duration::minutes(1), false),
            message(&a, &b, None, "new to ben", t0 + Duration::minutes(2), false),
        ]);

        let order: Vec<Uuid> = derive(a.id, &messages).iter().map(|c| c.other_user.id).collect();
        assert_eq!(order, vec![b.id, c.id]);
        assert!(derive(a.id, &[]).is_empty());
    }
}
