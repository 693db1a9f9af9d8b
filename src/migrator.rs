//! Programmatic schema migrations, run at startup when `auto_migrate` is set.

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_hotel_tables::Migration),
            Box::new(m20240101_000002_create_cart_tables::Migration),
            Box::new(m20240101_000003_create_order_tables::Migration),
            Box::new(m20240101_000004_create_coupon_tables::Migration),
            Box::new(m20240101_000005_create_membership_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_hotel_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_hotel_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Hotels::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Hotels::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Hotels::Name).string().not_null())
                        .col(
                            ColumnDef::new(Hotels::CgstRate)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Hotels::SgstRate)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Hotels::ServiceChargeRate)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Hotels::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Hotels::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DiningTables::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DiningTables::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DiningTables::HotelId).uuid().not_null())
                        .col(
                            ColumnDef::new(DiningTables::TableNumber)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DiningTables::Status).string().not_null())
                        .col(ColumnDef::new(DiningTables::ActiveOrderId).uuid().null())
                        .col(
                            ColumnDef::new(DiningTables::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DiningTables::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_dining_tables_hotel_table")
                        .table(DiningTables::Table)
                        .col(DiningTables::HotelId)
                        .col(DiningTables::TableNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DiningTables::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Hotels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Hotels {
        Table,
        Id,
        Name,
        CgstRate,
        SgstRate,
        ServiceChargeRate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum DiningTables {
        Table,
        Id,
        HotelId,
        TableNumber,
        Status,
        ActiveOrderId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_cart_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_cart_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Carts::OwnerKey).string().not_null())
                        .col(ColumnDef::new(Carts::HotelId).uuid().null())
                        .col(ColumnDef::new(Carts::TableNumber).integer().null())
                        .col(ColumnDef::new(Carts::Users).json().not_null())
                        .col(ColumnDef::new(Carts::AppliedCouponCode).string().null())
                        .col(
                            ColumnDef::new(Carts::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One cart per identity: user id or hotel_table composite.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_carts_owner_key")
                        .table(Carts::Table)
                        .col(Carts::OwnerKey)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CartItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::MenuItemId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Name).string().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(CartItems::Size).string().null())
                        .col(ColumnDef::new(CartItems::Addons).json().not_null())
                        .col(
                            ColumnDef::new(CartItems::Price)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::OrderedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(CartItems::SpecialInstructions)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CartItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_cart_items_cart_id")
                        .table(CartItems::Table)
                        .col(CartItems::CartId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        OwnerKey,
        HotelId,
        TableNumber,
        Users,
        AppliedCouponCode,
        DiscountAmount,
        TotalAmount,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        MenuItemId,
        Name,
        Quantity,
        Size,
        Addons,
        Price,
        OrderedBy,
        SpecialInstructions,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_order_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::HotelId).uuid().not_null())
                        .col(ColumnDef::new(Orders::TableNumber).integer().null())
                        .col(ColumnDef::new(Orders::Users).json().not_null())
                        .col(
                            ColumnDef::new(Orders::Subtotal)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::CgstAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::SgstAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::ServiceCharge)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::AmountPaid)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string().null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::CouponCode).string().null())
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(
                            ColumnDef::new(Orders::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_hotel_table")
                        .table(Orders::Table)
                        .col(Orders::HotelId)
                        .col(Orders::TableNumber)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::MenuItemId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::Size).string().null())
                        .col(ColumnDef::new(OrderItems::Addons).json().not_null())
                        .col(
                            ColumnDef::new(OrderItems::Price)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Status).string().not_null())
                        .col(
                            ColumnDef::new(OrderItems::PaymentStatus)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::PaymentMethod).string().null())
                        .col(ColumnDef::new(OrderItems::OrderedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(OrderItems::SpecialInstructions)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        HotelId,
        TableNumber,
        Users,
        Subtotal,
        CgstAmount,
        SgstAmount,
        ServiceCharge,
        DiscountAmount,
        TotalAmount,
        AmountPaid,
        PaymentStatus,
        PaymentMethod,
        Status,
        CouponCode,
        Notes,
        IsDeleted,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        MenuItemId,
        Name,
        Quantity,
        Size,
        Addons,
        Price,
        Status,
        PaymentStatus,
        PaymentMethod,
        OrderedBy,
        SpecialInstructions,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_coupon_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_coupon_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Coupons::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Coupons::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Coupons::Code).string().not_null())
                        .col(
                            ColumnDef::new(Coupons::TotalUses)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Coupons::UsedBy).json().not_null())
                        .col(
                            ColumnDef::new(Coupons::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Coupons::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupons_code")
                        .table(Coupons::Table)
                        .col(Coupons::Code)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CouponRedemptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CouponRedemptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CouponRedemptions::CouponId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CouponRedemptions::OrderId).uuid().not_null())
                        .col(ColumnDef::new(CouponRedemptions::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(CouponRedemptions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // The idempotency guarantee: one redemption per coupon per order.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coupon_redemptions_coupon_order")
                        .table(CouponRedemptions::Table)
                        .col(CouponRedemptions::CouponId)
                        .col(CouponRedemptions::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CouponRedemptions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Coupons::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Coupons {
        Table,
        Id,
        Code,
        TotalUses,
        UsedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CouponRedemptions {
        Table,
        Id,
        CouponId,
        OrderId,
        UserId,
        CreatedAt,
    }
}

mod m20240101_000005_create_membership_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_membership_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(UserMemberships::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UserMemberships::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserMemberships::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(UserMemberships::PlanName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UserMemberships::TotalMeals)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UserMemberships::RemainingMeals)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UserMemberships::ConsumedMeals)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(UserMemberships::Status).string().not_null())
                        .col(
                            ColumnDef::new(UserMemberships::TotalPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UserMemberships::PaymentMode)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(UserMemberships::Note).string().null())
                        .col(
                            ColumnDef::new(UserMemberships::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UserMemberships::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UserMemberships::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_user_memberships_user_id")
                        .table(UserMemberships::Table)
                        .col(UserMemberships::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(MembershipHistory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MembershipHistory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MembershipHistory::MembershipId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MembershipHistory::Action)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MembershipHistory::MealsChanged)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MembershipHistory::ConsumedMeals)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MembershipHistory::RemainingMeals)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MembershipHistory::MealType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MembershipHistory::Note).string().null())
                        .col(
                            ColumnDef::new(MembershipHistory::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_membership_history_membership_id")
                        .table(MembershipHistory::Table)
                        .col(MembershipHistory::MembershipId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MembershipHistory::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(UserMemberships::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum UserMemberships {
        Table,
        Id,
        UserId,
        PlanName,
        TotalMeals,
        RemainingMeals,
        ConsumedMeals,
        Status,
        TotalPrice,
        PaymentMode,
        Note,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum MembershipHistory {
        Table,
        Id,
        MembershipId,
        Action,
        MealsChanged,
        ConsumedMeals,
        RemainingMeals,
        MealType,
        Note,
        CreatedAt,
    }
}
